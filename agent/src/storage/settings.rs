//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Device-management API
    #[serde(default)]
    pub device: DeviceSettings,

    /// Local flow engine
    #[serde(default)]
    pub flow_engine: FlowEngineSettings,

    /// Cloud application platform
    #[serde(default)]
    pub cloud: CloudSettings,

    /// Reconciliation behaviour
    #[serde(default)]
    pub sync: SyncSettings,

    /// Background polls
    #[serde(default)]
    pub polling: PollingSettings,

    /// Local HTTP API
    #[serde(default)]
    pub server: ServerSettings,

    /// Enable local HTTP API
    #[serde(default = "default_true")]
    pub enable_socket_server: bool,

    /// Enable the flow revision watcher
    #[serde(default = "default_true")]
    pub enable_flow_watcher: bool,

    /// Agent start and stop
    #[serde(default)]
    pub lifecycle: LifecycleSettings,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            device: DeviceSettings::default(),
            flow_engine: FlowEngineSettings::default(),
            cloud: CloudSettings::default(),
            sync: SyncSettings::default(),
            polling: PollingSettings::default(),
            server: ServerSettings::default(),
            enable_socket_server: true,
            enable_flow_watcher: true,
            lifecycle: LifecycleSettings::default(),
        }
    }
}

/// Device-management API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Base URL of the device API
    #[serde(default = "default_device_url")]
    pub base_url: String,

    /// Session token sent in the `Authorization` header
    #[serde(default)]
    pub token: Option<String>,
}

fn default_device_url() -> String {
    "http://127.0.0.1".to_string()
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            base_url: default_device_url(),
            token: None,
        }
    }
}

/// Flow engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowEngineSettings {
    #[serde(default = "default_flow_engine_url")]
    pub base_url: String,
}

fn default_flow_engine_url() -> String {
    "http://127.0.0.1:1880".to_string()
}

impl Default for FlowEngineSettings {
    fn default() -> Self {
        Self {
            base_url: default_flow_engine_url(),
        }
    }
}

/// Cloud platform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Base URL for `portalapi/*` (accounts, token refresh)
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Base URL for `aiserverapi/*` (applications, files, models)
    #[serde(default = "default_app_server_url")]
    pub app_server_url: String,
}

fn default_portal_url() -> String {
    "https://sensecraft-portal.seeed.cc".to_string()
}

fn default_app_server_url() -> String {
    "https://sensecraft-aiserver-api.seeed.cc".to_string()
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            portal_url: default_portal_url(),
            app_server_url: default_app_server_url(),
        }
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Model ids shipped with the device firmware. Deploying one of these
    /// only rewrites the on-device description, never the binary.
    #[serde(default = "default_preset_model_ids")]
    pub preset_model_ids: Vec<String>,

    /// Flow used for applications created from a bare model
    #[serde(default = "default_flow")]
    pub default_flow: String,
}

fn default_preset_model_ids() -> Vec<String> {
    ["10001", "10002", "10003", "10004"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_flow() -> String {
    concat!(
        r#"[{"id":"30a71ccb9b1d15ef","type":"tab","label":"Flow 1","disabled":false,"info":"","env":[]},"#,
        r#"{"id":"9d4b3a6a5e8eaea6","type":"sscma","host":"localhost","mqttport":"1883","apiport":"80","clientid":"recamera","username":"","password":""},"#,
        r#"{"id":"144cb94c134b5e2a","type":"camera","z":"30a71ccb9b1d15ef","option":0,"light":false,"client":"9d4b3a6a5e8eaea6","x":150,"y":140,"wires":[["a7f38a5be039ae97"]]},"#,
        r#"{"id":"a7f38a5be039ae97","type":"model","z":"30a71ccb9b1d15ef","name":"","uri":"","model":"","tscore":0.45,"tiou":0.25,"debug":false,"trace":false,"counting":false,"classes":"","splitter":"0,0,0,0","client":"9d4b3a6a5e8eaea6","x":350,"y":140,"wires":[[]]}]"#
    )
    .to_string()
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            preset_model_ids: default_preset_model_ids(),
            default_flow: default_flow(),
        }
    }
}

/// One bounded poll: fixed interval, fixed attempt budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_attempts: u32,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Background poll settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Waiting for the device services after boot
    #[serde(default = "default_service_status_poll")]
    pub service_status: PollSettings,

    /// Following an OS update
    #[serde(default = "default_update_progress_poll")]
    pub update_progress: PollSettings,

    /// Seconds between flow revision checks
    #[serde(default = "default_flow_watch_interval")]
    pub flow_watch_interval_secs: u64,
}

fn default_service_status_poll() -> PollSettings {
    PollSettings {
        interval_secs: 5,
        max_attempts: 30,
    }
}

fn default_update_progress_poll() -> PollSettings {
    PollSettings {
        interval_secs: 1,
        max_attempts: 1800,
    }
}

fn default_flow_watch_interval() -> u64 {
    10
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            service_status: default_service_status_poll(),
            update_progress: default_update_progress_poll(),
            flow_watch_interval_secs: default_flow_watch_interval(),
        }
    }
}

/// Local HTTP API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8780
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Agent start and stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSettings {
    /// Wait for the device services before the first sync
    #[serde(default = "default_true")]
    pub wait_for_services: bool,

    /// Maximum delay for graceful shutdown
    #[serde(default = "default_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_shutdown_delay() -> u64 {
    30
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            wait_for_services: true,
            max_shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}
