//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;
use crate::workers::{flow_watcher, poll};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Enable local HTTP server
    pub enable_socket_server: bool,

    /// Enable flow revision watcher
    pub enable_flow_watcher: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Flow watcher options
    pub flow_watcher: flow_watcher::Options,

    /// Service status wait before the first sync
    pub service_wait: poll::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for AppOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                wait_for_services: settings.lifecycle.wait_for_services,
                max_shutdown_delay: Duration::from_secs(settings.lifecycle.max_shutdown_delay_secs),
            },
            enable_socket_server: settings.enable_socket_server,
            enable_flow_watcher: settings.enable_flow_watcher,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            flow_watcher: flow_watcher::Options {
                interval: Duration::from_secs(settings.polling.flow_watch_interval_secs),
            },
            service_wait: poll::Options::from(&settings.polling.service_status),
        }
    }
}

/// Lifecycle options for the agent
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Wait for the device services before the first sync
    pub wait_for_services: bool,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}
