//! Bounded fixed-interval polling

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::storage::settings::PollSettings;

/// Resolves once the agent starts shutting down
pub type ShutdownSignal = BoxFuture<'static, ()>;

/// Poll options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between two probes
    pub interval: Duration,

    /// Probes before giving up
    pub max_attempts: u32,
}

impl From<&PollSettings> for Options {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: settings.interval(),
            max_attempts: settings.max_attempts,
        }
    }
}

/// What one probe saw
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// Not there yet, probe again
    Pending,
    Done(T),
    Failed(String),
}

/// How the poll ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    Failed(String),
    /// The attempt budget ran out
    Exhausted,
    /// Shutdown was signalled
    Cancelled,
}

/// Probe until a terminal step, the attempt budget runs out or shutdown is
/// signalled. The first probe runs immediately.
pub async fn run<T, P, PF, S, SF>(
    name: &str,
    options: &Options,
    mut probe: P,
    sleep_fn: S,
    mut shutdown_signal: ShutdownSignal,
) -> Outcome<T>
where
    P: FnMut(u32) -> PF,
    PF: Future<Output = Step<T>>,
    S: Fn(Duration) -> SF,
    SF: Future<Output = ()>,
{
    for attempt in 1..=options.max_attempts {
        match probe(attempt).await {
            Step::Done(value) => {
                info!("{} finished after {} attempt(s)", name, attempt);
                return Outcome::Done(value);
            }
            Step::Failed(err) => {
                info!("{} failed: {}", name, err);
                return Outcome::Failed(err);
            }
            Step::Pending => {
                debug!("{} pending ({}/{})", name, attempt, options.max_attempts);
            }
        }

        if attempt == options.max_attempts {
            break;
        }
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("{} cancelled by shutdown", name);
                return Outcome::Cancelled;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }

    info!("{} gave up after {} attempt(s)", name, options.max_attempts);
    Outcome::Exhausted
}

/// A shutdown signal that never fires
pub fn no_shutdown() -> ShutdownSignal {
    Box::pin(std::future::pending())
}
