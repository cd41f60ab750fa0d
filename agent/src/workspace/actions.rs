//! Workspace entry actions

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

/// How the workspace was opened: a fresh app, a specific app, a copy of
/// one, an app built around a published model, or plain sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum WorkspaceAction {
    New,
    App { app_id: String },
    Clone { app_id: String },
    Model { model_id: String },
    Normal,
}

impl WorkspaceAction {
    pub fn parse(
        action: &str,
        app_id: Option<&str>,
        model_id: Option<&str>,
    ) -> Result<Self, AgentError> {
        let require = |value: Option<&str>, name: &str| {
            value
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    AgentError::ValidationError(format!("action '{}' requires {}", action, name))
                })
        };

        match action.to_lowercase().as_str() {
            "new" => Ok(WorkspaceAction::New),
            "app" => Ok(WorkspaceAction::App {
                app_id: require(app_id, "app_id")?,
            }),
            "clone" => Ok(WorkspaceAction::Clone {
                app_id: require(app_id, "app_id")?,
            }),
            "model" => Ok(WorkspaceAction::Model {
                model_id: require(model_id, "model_id")?,
            }),
            "normal" | "" => Ok(WorkspaceAction::Normal),
            other => Err(AgentError::ValidationError(format!(
                "unknown workspace action: {}",
                other
            ))),
        }
    }

    /// Whether the action moves the device to another application
    pub fn switches_app(&self) -> bool {
        !matches!(self, WorkspaceAction::Normal)
    }
}
