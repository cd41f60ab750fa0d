//! Waiting for the device services to come up

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::http::api::SystemApi;
use crate::workers::poll::{self, Outcome, ShutdownSignal, Step};

/// Uptime after which the services are expected to be up
const EXPECTED_STARTUP_MS: u64 = 100 * 1000;

/// Highest estimate shown before the services confirm they run
const MAX_ESTIMATE: f64 = 99.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServicesState {
    Starting,
    Running,
    Failed,
}

/// Startup progress reported while waiting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StartupProgress {
    pub state: ServicesState,
    /// Percent, two decimals
    pub percent: f64,
}

impl Default for StartupProgress {
    fn default() -> Self {
        Self {
            state: ServicesState::Starting,
            percent: 0.0,
        }
    }
}

/// Startup estimate from the device uptime in milliseconds
pub fn estimate_progress(uptime_ms: u64) -> f64 {
    let percent = uptime_ms as f64 / EXPECTED_STARTUP_MS as f64 * 100.0;
    if percent >= 100.0 {
        return MAX_ESTIMATE;
    }
    (percent * 100.0).round() / 100.0
}

/// Poll the service status until every service runs. Progress updates are
/// published on `progress`; the final state is returned.
pub async fn wait_for_services<S, F>(
    system: Arc<dyn SystemApi>,
    options: &poll::Options,
    progress: watch::Sender<StartupProgress>,
    sleep_fn: S,
    shutdown_signal: ShutdownSignal,
) -> ServicesState
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    progress.send_replace(StartupProgress::default());

    let outcome = poll::run(
        "Service status wait",
        options,
        |_| {
            let system = system.clone();
            let progress = &progress;
            async move {
                match system.get_service_status().await {
                    Ok(report) if report.all_running() => Step::Done(()),
                    Ok(report) => {
                        let percent = estimate_progress(report.uptime);
                        debug!("Services starting ({:.2}%): {:?}", percent, report);
                        progress.send_replace(StartupProgress {
                            state: ServicesState::Starting,
                            percent,
                        });
                        Step::Pending
                    }
                    Err(e) => {
                        warn!("Service status query failed: {}", e);
                        Step::Pending
                    }
                }
            }
        },
        sleep_fn,
        shutdown_signal,
    )
    .await;

    let state = match outcome {
        Outcome::Done(()) => ServicesState::Running,
        _ => ServicesState::Failed,
    };
    let percent = if state == ServicesState::Running {
        100.0
    } else {
        progress.borrow().percent
    };
    progress.send_replace(StartupProgress { state, percent });
    state
}
