//! The device workspace: bound application, account and app management

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::authn::session::CloudSession;
use crate::errors::AgentError;
use crate::http::api::Collaborators;
use crate::models::app::{AppDraft, AppUpdate, CloudApplication};
use crate::models::flow::FlowDocument;
use crate::models::platform::PlatformInfo;
use crate::sync::binding::Binding;
use crate::sync::equivalence::is_equivalent;
use crate::sync::prompt::{FixedPrompter, Prompter};
use crate::sync::reconciler::{Reconciler, SyncOutcome, UNTITLED_APP};
use crate::workspace::actions::WorkspaceAction;

/// What `GET /workspace` reports
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceStatus {
    pub signed_in: bool,
    pub nickname: Option<String>,
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    pub revision: Option<String>,
    pub has_dashboard: bool,
}

pub struct Workspace {
    collaborators: Collaborators,
    reconciler: Reconciler,
    session: Arc<CloudSession>,
    default_flow: FlowDocument,
    binding: RwLock<Binding>,
}

impl Workspace {
    pub fn new(
        collaborators: Collaborators,
        session: Arc<CloudSession>,
        preset_model_ids: Vec<String>,
        default_flow: FlowDocument,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(&collaborators, preset_model_ids),
            collaborators,
            session,
            default_flow,
            binding: RwLock::new(Binding::default()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn session(&self) -> &Arc<CloudSession> {
        &self.session
    }

    /// Load the session and the bound application from the device
    pub async fn restore(&self) -> Result<(), AgentError> {
        let Some(info) = self.collaborators.device.get_platform_info().await? else {
            info!("No platform info on the device yet");
            return Ok(());
        };
        self.session.replace(&info.user_info).await;
        if let Some(app) = &info.app_info {
            info!("Restored binding to application {}", app.app_id);
        }
        *self.binding.write().await = Binding::new(info.app_info);
        Ok(())
    }

    /// Copy of the current binding
    pub async fn binding(&self) -> Binding {
        self.binding.read().await.clone()
    }

    /// Store `binding` and persist it with the session. Concurrent
    /// operations each commit their own copy; the last one wins.
    pub async fn commit(&self, binding: Binding) -> Result<(), AgentError> {
        let info = PlatformInfo {
            user_info: self.session.to_user_info().await,
            app_info: binding.app().cloned(),
        };
        *self.binding.write().await = binding;
        self.collaborators.device.save_platform_info(&info).await?;
        debug!("Platform info saved");
        Ok(())
    }

    /// Record a revision seen on the engine. Revisions are not persisted.
    pub async fn observe_revision(&self, revision: &str) {
        self.binding.write().await.observe_revision(revision);
    }

    /// Commit whatever `binding` holds, then surface `result`
    async fn settle<T>(
        &self,
        before: &Binding,
        binding: Binding,
        result: Result<T, AgentError>,
    ) -> Result<T, AgentError> {
        if &binding != before {
            self.commit(binding).await?;
        }
        result
    }

    pub async fn status(&self) -> WorkspaceStatus {
        let binding = self.binding().await;
        let user = self.session.to_user_info().await;
        WorkspaceStatus {
            signed_in: self.session.is_signed_in().await,
            nickname: user.nickname,
            app_id: binding.app_id().map(str::to_string),
            app_name: binding.app().map(|app| app.app_name.clone()),
            revision: binding.revision().map(str::to_string),
            has_dashboard: binding
                .app()
                .map(|app| app.flow_data.has_dashboard())
                .unwrap_or(false),
        }
    }

    /// Refresh the account nickname from the cloud
    pub async fn refresh_account(&self) -> Result<String, AgentError> {
        let user = self.collaborators.cloud.user_info().await?;
        self.session.set_nickname(user.nickname.clone()).await;
        Ok(user.nickname)
    }

    // ============================== RECONCILIATION ================================ //

    pub async fn sync(&self, prompter: &dyn Prompter) -> Result<SyncOutcome, AgentError> {
        let before = self.binding().await;
        let mut binding = before.clone();
        let result = self.reconciler.check_and_sync(&mut binding, prompter).await;
        self.settle(&before, binding, result).await
    }

    /// CheckAndSync with nobody to answer, skipped while signed out
    pub async fn startup_sync(&self) -> Result<Option<SyncOutcome>, AgentError> {
        if !self.session.is_signed_in().await {
            info!("Not signed in to the cloud, skipping initial sync");
            return Ok(None);
        }
        self.sync(&FixedPrompter::deferred()).await.map(Some)
    }

    /// Save the device state into the bound application
    pub async fn save(&self) -> Result<SyncOutcome, AgentError> {
        let before = self.binding().await;
        let app_id = before
            .app_id()
            .ok_or_else(|| AgentError::NotFound("no application is bound".to_string()))?
            .to_string();
        let app = self
            .reconciler
            .fetch_cloud(&app_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("application {}", app_id)))?;

        let mut binding = before.clone();
        let result = self.reconciler.save_local_to_cloud(&mut binding, &app).await;
        self.settle(&before, binding, result).await
    }

    /// Load an application onto the device, replacing what runs there
    pub async fn load(&self, app_id: &str) -> Result<SyncOutcome, AgentError> {
        let app = self.collaborators.cloud.view_app(app_id).await?;
        self.load_record(&app).await
    }

    async fn load_record(&self, app: &CloudApplication) -> Result<SyncOutcome, AgentError> {
        let before = self.binding().await;
        let mut binding = before.clone();
        let result = self.reconciler.load_cloud_to_local(&mut binding, app).await;
        self.settle(&before, binding, result).await
    }

    /// Create an application from the device state and bind it
    pub async fn create(&self, name: Option<String>) -> Result<SyncOutcome, AgentError> {
        let before = self.binding().await;
        let mut binding = before.clone();
        let result = self
            .reconciler
            .create_from_local(&mut binding, name, None, None)
            .await;
        self.settle(&before, binding, result).await
    }

    /// Offer to save the device state before it gets replaced. An error
    /// means the switch must not happen.
    pub async fn save_check(&self, prompter: &dyn Prompter) -> Result<(), AgentError> {
        let local = self.reconciler.read_local().await?;
        let local_model = local.model_descriptor();
        let before = self.binding().await;

        let bound = match before.app_id() {
            Some(app_id) => self.reconciler.fetch_cloud(app_id).await?,
            None => None,
        };

        if let Some(app) = bound {
            if is_equivalent(&local.flow, local_model.as_ref(), &app) {
                return Ok(());
            }
            let question = format!("Save the current application \"{}\"?", app.app_name);
            if prompter.confirm(&question).await {
                let mut binding = before.clone();
                let result = self.reconciler.save_local_to_cloud(&mut binding, &app).await;
                self.settle(&before, binding, result).await?;
            }
            return Ok(());
        }

        if local.flow.is_empty() {
            return Ok(());
        }
        if prompter
            .confirm("Save the current device data as a new application?")
            .await
        {
            let record = self
                .reconciler
                .create_record(None, Some(local.flow), local_model)
                .await?;
            info!("Saved device data as application {}", record.app_id);
        }
        Ok(())
    }

    pub async fn apply_action(
        &self,
        action: WorkspaceAction,
        prompter: &dyn Prompter,
    ) -> Result<SyncOutcome, AgentError> {
        info!("Workspace action: {:?}", action);
        if action.switches_app() {
            self.save_check(prompter).await?;
        }

        match action {
            WorkspaceAction::Normal => self.sync(prompter).await,
            WorkspaceAction::App { app_id } => self.load(&app_id).await,
            WorkspaceAction::New => {
                let draft = AppDraft {
                    app_name: Some(UNTITLED_APP.to_string()),
                    flow_data: Some(FlowDocument::empty()),
                    model_data: None,
                };
                self.create_and_load(&draft).await
            }
            WorkspaceAction::Clone { app_id } => {
                let source = self.collaborators.cloud.view_app(&app_id).await?;
                if let Some(model) = &source.model_data {
                    self.reconciler.transfer().ensure_on_device(model).await?;
                }
                let draft = AppDraft {
                    app_name: Some(format!("{}_clone", source.app_name)),
                    flow_data: Some(source.flow_data.clone()),
                    model_data: source.model_data.clone(),
                };
                self.create_and_load(&draft).await
            }
            WorkspaceAction::Model { model_id } => {
                let model = self.collaborators.cloud.apply_model(&model_id).await?;
                self.reconciler.transfer().ensure_on_device(&model).await?;
                let draft = AppDraft {
                    app_name: Some(model.model_name.clone()).filter(|n| !n.is_empty()),
                    flow_data: Some(self.default_flow.clone()),
                    model_data: Some(model),
                };
                self.create_and_load(&draft).await
            }
        }
    }

    /// Create a record from `draft` and make the device run it
    async fn create_and_load(&self, draft: &AppDraft) -> Result<SyncOutcome, AgentError> {
        let app_id = self.collaborators.cloud.create_app(draft).await?;
        let app = self.collaborators.cloud.view_app(&app_id).await?;
        info!("Created application {} ({})", app.app_name, app.app_id);
        let before = self.binding().await;
        let mut binding = before.clone();
        let result = self.reconciler.bind_created(&mut binding, &app).await;
        self.settle(&before, binding, result).await
    }

    // ============================== APP MANAGEMENT ================================ //

    pub async fn list(&self) -> Result<Vec<CloudApplication>, AgentError> {
        self.collaborators.cloud.list_apps().await
    }

    /// Load `app_id` unless it is already the bound application
    pub async fn select(&self, app_id: &str) -> Result<Option<SyncOutcome>, AgentError> {
        if self.binding().await.is_bound_to(app_id) {
            debug!("Application {} already bound", app_id);
            return Ok(None);
        }
        self.load(app_id).await.map(Some)
    }

    pub async fn rename(&self, app_id: &str, name: &str) -> Result<(), AgentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgentError::ValidationError(
                "application name must not be empty".to_string(),
            ));
        }
        self.collaborators
            .cloud
            .update_app(&AppUpdate {
                app_id: app_id.to_string(),
                app_name: Some(name.to_string()),
                ..Default::default()
            })
            .await?;
        info!("Renamed application {} to {}", app_id, name);

        let mut binding = self.binding().await;
        if let Some(mut app) = binding.app().filter(|app| app.app_id == app_id).cloned() {
            app.app_name = name.to_string();
            binding.bind(app, None);
            self.commit(binding).await?;
        }
        Ok(())
    }

    /// Delete an application and its stored model. Deleting the bound
    /// application moves the device to the first remaining one.
    pub async fn delete(&self, app_id: &str) -> Result<Option<SyncOutcome>, AgentError> {
        let record = self.reconciler.fetch_cloud(app_id).await?;
        self.collaborators.cloud.delete_app(app_id).await?;
        info!("Deleted application {}", app_id);

        if let Some(model) = record
            .as_ref()
            .and_then(|app| app.model_data.as_ref())
            .filter(|model| model.is_local())
        {
            let object_name = model.object_name(app_id);
            if let Err(e) = self.collaborators.cloud.remove_file(&object_name).await {
                warn!("Failed to remove stored model {}: {}", object_name, e);
            }
        }

        if !self.binding().await.is_bound_to(app_id) {
            return Ok(None);
        }

        let remaining = self.collaborators.cloud.list_apps().await?;
        match remaining.into_iter().find(|app| app.app_id != app_id) {
            Some(next) => self.load_record(&next).await.map(Some),
            None => {
                let mut binding = self.binding().await;
                binding.clear();
                self.commit(binding).await?;
                info!("No application left to bind");
                Ok(None)
            }
        }
    }

    // ============================== EXTERNAL DEPLOYS ============================== //

    /// A flow revision this agent did not push showed up on the engine
    pub async fn on_flow_deployed(
        &self,
        revision: &str,
        prompter: &dyn Prompter,
    ) -> Result<Option<SyncOutcome>, AgentError> {
        let before = self.binding().await;
        if before.revision() == Some(revision) {
            return Ok(None);
        }
        info!("Flow revision {} deployed outside the agent", revision);

        let stored = self
            .collaborators
            .device
            .get_platform_info()
            .await?
            .unwrap_or_default();

        let mut binding = before.clone();
        binding.observe_revision(revision);

        if stored.user_info.refresh_token != self.session.refresh_token().await {
            prompter
                .notify("The cloud account on this device has changed; the application list is now different.")
                .await;
            self.session.replace(&stored.user_info).await;
            binding = Binding::new(stored.app_info.clone());
            binding.observe_revision(revision);
            self.commit(binding).await?;
            return Ok(None);
        }

        let stored_id = stored.app_info.as_ref().map(|app| app.app_id.as_str());
        if stored_id != before.app_id() {
            prompter
                .notify("Only one flow can run on the device; the workspace now follows the flow running on it.")
                .await;
            binding = Binding::new(stored.app_info.clone());
            binding.observe_revision(revision);
            self.commit(binding).await?;
            return Ok(None);
        }

        let Some(app) = stored.app_info else {
            self.commit(binding).await?;
            return Ok(None);
        };
        let result = self.reconciler.save_local_to_cloud(&mut binding, &app).await;
        self.settle(&before, binding, result).await.map(Some)
    }
}
