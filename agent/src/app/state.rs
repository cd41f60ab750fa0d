//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::authn::session::CloudSession;
use crate::errors::AgentError;
use crate::http::api::Collaborators;
use crate::http::blob::HttpBlobStore;
use crate::http::cloud::CloudClient;
use crate::http::device::DeviceClient;
use crate::http::flows::FlowEngineClient;
use crate::models::flow::FlowDocument;
use crate::storage::settings::Settings;
use crate::workspace::service::Workspace;

/// Main application state
pub struct AppState {
    /// Clients of every collaborator
    pub collaborators: Collaborators,

    /// Cloud account tokens
    pub session: Arc<CloudSession>,

    /// Bound application and app management
    pub workspace: Arc<Workspace>,
}

impl AppState {
    /// Build the clients from `settings` and restore the workspace
    pub async fn init(settings: &Settings) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let session = Arc::new(CloudSession::default());
        let device = Arc::new(DeviceClient::new(
            &settings.device.base_url,
            settings.device.token.clone(),
        )?);
        let collaborators = Collaborators {
            device: device.clone(),
            system: device,
            flows: Arc::new(FlowEngineClient::new(&settings.flow_engine.base_url)?),
            cloud: Arc::new(CloudClient::new(
                &settings.cloud.portal_url,
                &settings.cloud.app_server_url,
                session.clone(),
            )?),
            blobs: Arc::new(HttpBlobStore::new()?),
        };

        Self::with_collaborators(collaborators, session, settings).await
    }

    /// Restore the workspace over already built collaborators
    pub async fn with_collaborators(
        collaborators: Collaborators,
        session: Arc<CloudSession>,
        settings: &Settings,
    ) -> Result<Self, AgentError> {
        let workspace = Arc::new(Workspace::new(
            collaborators.clone(),
            session.clone(),
            settings.sync.preset_model_ids.clone(),
            FlowDocument::new(settings.sync.default_flow.clone()),
        ));
        workspace.restore().await?;

        Ok(Self {
            collaborators,
            session,
            workspace,
        })
    }
}
