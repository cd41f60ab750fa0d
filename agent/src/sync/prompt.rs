//! Questions the reconciler has to ask a person

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use crate::models::app::CloudApplication;
use crate::sync::equivalence::ReconciliationDecision;

/// Which side wins when local and cloud state disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prefer {
    /// Keep the device state and overwrite the cloud record
    Local,
    /// Keep the cloud record and overwrite the device
    Cloud,
}

impl std::str::FromStr for Prefer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "device" => Ok(Prefer::Local),
            "cloud" => Ok(Prefer::Cloud),
            _ => Err(format!("Invalid side: {}", s)),
        }
    }
}

#[async_trait]
pub trait Prompter: Send + Sync {
    /// `None` means the user did not decide
    async fn choose_side(
        &self,
        app: &CloudApplication,
        decision: ReconciliationDecision,
    ) -> Option<Prefer>;

    /// Yes/no confirmation
    async fn confirm(&self, question: &str) -> bool;

    /// Something the user should know about but cannot answer
    async fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Answers decided up front (CLI flags, request bodies)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPrompter {
    pub prefer: Option<Prefer>,
    pub confirm: bool,
}

impl FixedPrompter {
    pub fn new(prefer: Option<Prefer>, confirm: bool) -> Self {
        Self { prefer, confirm }
    }

    /// Never decides, never confirms
    pub fn deferred() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Prompter for FixedPrompter {
    async fn choose_side(
        &self,
        app: &CloudApplication,
        decision: ReconciliationDecision,
    ) -> Option<Prefer> {
        info!(
            "Application {} differs from device ({:?}), answering {:?}",
            app.app_id, decision, self.prefer
        );
        self.prefer
    }

    async fn confirm(&self, question: &str) -> bool {
        info!("{} -> {}", question, if self.confirm { "yes" } else { "no" });
        self.confirm
    }
}

/// Interactive terminal prompts
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    async fn ask(&self, question: &str) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await.ok()?;
        stdout.flush().await.ok()?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_lowercase()),
            _ => None,
        }
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn choose_side(
        &self,
        app: &CloudApplication,
        decision: ReconciliationDecision,
    ) -> Option<Prefer> {
        let hint = match decision {
            ReconciliationDecision::LocalNewer => " (device has newer changes)",
            ReconciliationDecision::CloudNewer => " (cloud has newer changes)",
            _ => "",
        };
        let question = format!(
            "Application \"{}\" on the device differs from the cloud{}.\n\
             Keep [l]ocal (overwrite cloud), keep [c]loud (overwrite device), or [s]kip? ",
            app.app_name, hint
        );
        match self.ask(&question).await?.as_str() {
            "l" | "local" => Some(Prefer::Local),
            "c" | "cloud" => Some(Prefer::Cloud),
            _ => None,
        }
    }

    async fn confirm(&self, question: &str) -> bool {
        matches!(
            self.ask(&format!("{} [y/N] ", question)).await.as_deref(),
            Some("y") | Some("yes")
        )
    }

    async fn notify(&self, message: &str) {
        println!("{}", message);
    }
}
