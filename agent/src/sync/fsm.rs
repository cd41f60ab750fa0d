//! Finite State Machine for one reconciliation attempt

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// Reconciliation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    /// Nothing in progress
    Idle,

    /// Reading both sides and comparing them
    Comparing,

    /// Pushing the device model to cloud storage
    UploadingModel,

    /// Both sides already agree
    InSync,

    /// Waiting for the user to pick a side
    NeedsUserDecision,

    /// Writing the chosen side over the other
    Applying,

    /// A step failed; nothing after it ran
    Failed,
}

/// Reconciliation event
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    /// Start comparing local and cloud state
    Compare,

    /// Comparison found no difference
    Matched,

    /// The device model must be uploaded first
    NeedsUpload,

    /// Comparison found a difference only the user can settle
    Diverged,

    /// Start writing
    Apply,

    /// The user gave no answer
    Undecided,

    /// The attempt is over
    Done,

    /// A step failed
    Fail(String),

    /// Clear a failure
    Reset,
}

/// Reconciliation FSM
#[derive(Debug, Clone)]
pub struct ReconcileFsm {
    state: ReconcileState,
    error: Option<String>,
}

impl ReconcileFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: ReconcileState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ReconcileEvent) -> Result<ReconcileState, AgentError> {
        use ReconcileEvent as E;
        use ReconcileState as S;

        let new_state = match (self.state, &event) {
            // From Idle
            (S::Idle, E::Compare) => {
                self.error = None;
                S::Comparing
            }

            // From Comparing
            (S::Comparing, E::Matched) => S::InSync,
            (S::Comparing, E::NeedsUpload) => S::UploadingModel,
            (S::Comparing, E::Diverged) => S::NeedsUserDecision,
            (S::Comparing, E::Apply) => S::Applying,

            // From UploadingModel
            (S::UploadingModel, E::Apply) => S::Applying,

            // From NeedsUserDecision
            (S::NeedsUserDecision, E::NeedsUpload) => S::UploadingModel,
            (S::NeedsUserDecision, E::Apply) => S::Applying,
            (S::NeedsUserDecision, E::Undecided) => S::Idle,

            // Terminal steps
            (S::InSync, E::Done) => S::Idle,
            (S::Applying, E::Done) => S::Idle,

            // Failures
            (S::Idle | S::Failed, E::Fail(_)) => {
                return Err(self.invalid(&event));
            }
            (_, E::Fail(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            // From Failed
            (S::Failed, E::Reset) => {
                self.error = None;
                S::Idle
            }

            // Invalid transitions
            _ => return Err(self.invalid(&event)),
        };

        self.state = new_state;
        Ok(new_state)
    }

    fn invalid(&self, event: &ReconcileEvent) -> AgentError {
        AgentError::InvalidTransition(format!("{:?} -> {:?}", self.state, event))
    }
}

impl Default for ReconcileFsm {
    fn default() -> Self {
        Self::new()
    }
}
