//! The application the device is bound to

use serde::Serialize;

use crate::models::app::CloudApplication;

/// Snapshot of the active cloud application plus the last flow revision
/// this agent saw on the engine. Owned by the caller and handed to every
/// reconciler operation; nothing else mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Binding {
    app: Option<CloudApplication>,
    revision: Option<String>,
}

impl Binding {
    pub fn new(app: Option<CloudApplication>) -> Self {
        Self {
            app,
            revision: None,
        }
    }

    pub fn app(&self) -> Option<&CloudApplication> {
        self.app.as_ref()
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app.as_ref().map(|app| app.app_id.as_str())
    }

    pub fn is_bound_to(&self, app_id: &str) -> bool {
        self.app_id() == Some(app_id)
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn bind(&mut self, app: CloudApplication, revision: Option<String>) {
        self.app = Some(app);
        if revision.is_some() {
            self.revision = revision;
        }
    }

    /// Record a revision without touching the bound application
    pub fn observe_revision(&mut self, revision: impl Into<String>) {
        self.revision = Some(revision.into());
    }

    pub fn clear(&mut self) {
        self.app = None;
    }
}
