//! OS update check, apply and progress tracking

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::errors::AgentError;
use crate::http::api::SystemApi;
use crate::models::device::{DeviceInfo, UpdateVersionInfo};
use crate::workers::poll::{self, Outcome, ShutdownSignal, Step};

const PACKAGE_NAME: &str = "upgrade.zip";

/// Result of an update check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateCheck {
    /// No channel URL configured yet
    Unconfigured,
    /// The device is already installing an update
    Updating,
    UpToDate,
    Available {
        os_name: String,
        os_version: String,
        download_url: String,
    },
}

/// Compare the device OS with what the update channel offers
pub fn evaluate(device: &DeviceInfo, offered: &UpdateVersionInfo) -> UpdateCheck {
    if offered.is_upgrading {
        return UpdateCheck::Updating;
    }
    if offered.os_name.is_empty() || offered.os_version.is_empty() {
        return UpdateCheck::UpToDate;
    }
    if device.os_name == offered.os_name && device.os_version == offered.os_version {
        return UpdateCheck::UpToDate;
    }
    UpdateCheck::Available {
        os_name: offered.os_name.clone(),
        os_version: offered.os_version.clone(),
        download_url: format!(
            "{}/{}",
            offered.download_url.trim_end_matches('/'),
            PACKAGE_NAME
        ),
    }
}

pub async fn check(system: &dyn SystemApi) -> Result<UpdateCheck, AgentError> {
    let device = system.get_device_info().await?;
    let url = device.update_url();
    if url.is_empty() {
        return Ok(UpdateCheck::Unconfigured);
    }
    let offered = system.get_update_version_info(url, device.channel).await?;
    let result = evaluate(&device, &offered);
    info!("Update check against {}: {:?}", url, result);
    Ok(result)
}

/// How an update run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateResult {
    /// Installed; the device needs a restart
    Done,
    /// Progress could not be read; the update was cancelled
    Cancelled,
    /// The attempt budget ran out
    TimedOut,
    /// The agent is shutting down
    Interrupted,
}

/// Start installing from `download_url` and follow the progress
pub async fn apply<S, F>(
    system: Arc<dyn SystemApi>,
    download_url: &str,
    options: &poll::Options,
    sleep_fn: S,
    shutdown_signal: ShutdownSignal,
) -> Result<UpdateResult, AgentError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    system.apply_system_update(download_url).await?;
    info!("System update started from {}", download_url);
    follow(system, options, sleep_fn, shutdown_signal).await
}

/// Follow an update already in progress
pub async fn follow<S, F>(
    system: Arc<dyn SystemApi>,
    options: &poll::Options,
    sleep_fn: S,
    shutdown_signal: ShutdownSignal,
) -> Result<UpdateResult, AgentError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    let outcome = poll::run(
        "System update",
        options,
        |_| {
            let system = system.clone();
            async move {
                match system.get_update_progress().await {
                    Ok(p) if p.progress >= 100.0 => Step::Done(()),
                    Ok(p) => {
                        info!("System update at {:.0}%", p.progress);
                        Step::Pending
                    }
                    Err(e) => Step::Failed(e.to_string()),
                }
            }
        },
        sleep_fn,
        shutdown_signal,
    )
    .await;

    match outcome {
        Outcome::Done(()) => {
            info!("System update installed, restart required");
            Ok(UpdateResult::Done)
        }
        Outcome::Failed(err) => {
            error!("System update progress unavailable: {}", err);
            if let Err(e) = system.cancel_update().await {
                warn!("Failed to cancel the update: {}", e);
            }
            Ok(UpdateResult::Cancelled)
        }
        Outcome::Exhausted => Ok(UpdateResult::TimedOut),
        Outcome::Cancelled => Ok(UpdateResult::Interrupted),
    }
}
