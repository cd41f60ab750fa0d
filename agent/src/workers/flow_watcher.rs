//! Flow revision watcher
//!
//! Detects deploys made in the flow editor: a revision on the engine that
//! differs from the last one the workspace recorded.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::http::api::FlowEngineApi;
use crate::sync::prompt::Prompter;
use crate::workers::poll::ShutdownSignal;
use crate::workspace::service::Workspace;

/// Watcher options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Check the engine revision once
pub async fn check_once(
    flows: &dyn FlowEngineApi,
    workspace: &Workspace,
    prompter: &dyn Prompter,
) {
    let revision = match flows.get_flows().await {
        Ok(snapshot) => snapshot.rev,
        Err(e) => {
            error!("Failed to read flow revision: {}", e);
            return;
        }
    };
    let Some(revision) = revision else {
        return;
    };

    let binding = workspace.binding().await;
    match binding.revision() {
        Some(known) if known == revision => {}
        None => {
            // First observation after start: nothing to compare against
            debug!("Flow revision is {}", revision);
            workspace.observe_revision(&revision).await;
        }
        Some(_) => match workspace.on_flow_deployed(&revision, prompter).await {
            Ok(Some(outcome)) => info!("Editor deploy handled: {:?}", outcome),
            Ok(None) => {}
            Err(e) => error!("Failed to save editor deploy: {}", e),
        },
    }
}

/// Run the flow watcher worker
pub async fn run<S, F>(
    options: &Options,
    flows: Arc<dyn FlowEngineApi>,
    workspace: Arc<Workspace>,
    prompter: Arc<dyn Prompter>,
    sleep_fn: S,
    mut shutdown_signal: ShutdownSignal,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Flow watcher starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Flow watcher shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        check_once(flows.as_ref(), &workspace, prompter.as_ref()).await;
    }
}
