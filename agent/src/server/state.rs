//! Server state

use std::sync::Arc;

use crate::http::api::SystemApi;
use crate::workspace::service::Workspace;

/// Server state shared across handlers
pub struct ServerState {
    pub workspace: Arc<Workspace>,
    pub system: Arc<dyn SystemApi>,
}

impl ServerState {
    pub fn new(workspace: Arc<Workspace>, system: Arc<dyn SystemApi>) -> Self {
        Self { workspace, system }
    }
}
