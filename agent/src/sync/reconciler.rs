//! Local/cloud application reconciliation
//!
//! Each operation walks a [`ReconcileFsm`] one step at a time and awaits
//! every collaborator call in order. The first failing step aborts the
//! rest; there are no retries. The [`Binding`] is only written once the
//! side effect it describes has happened.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::http::api::{CloudApi, Collaborators, DeviceApi, FlowEngineApi};
use crate::models::app::{AppDraft, AppUpdate, CloudApplication};
use crate::models::device::LocalModel;
use crate::models::flow::{EngineState, FlowDocument};
use crate::models::model::ModelDescriptor;
use crate::sync::binding::Binding;
use crate::sync::equivalence::{decide, is_equivalent, ReconciliationDecision};
use crate::sync::fsm::{ReconcileEvent, ReconcileFsm};
use crate::sync::prompt::{Prefer, Prompter};
use crate::sync::transfer::{needs_upload, DownloadOutcome, ModelTransfer};

pub const UNTITLED_APP: &str = "Untitled";

/// State read from the device in one pass
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    pub flow: FlowDocument,
    pub revision: Option<String>,
    /// Only read when the flow has a `model` node
    pub model: Option<LocalModel>,
}

impl LocalState {
    /// Installed model as the cloud would record it
    pub fn model_descriptor(&self) -> Option<ModelDescriptor> {
        self.model.as_ref().and_then(LocalModel::to_descriptor)
    }
}

/// What a reconciliation attempt did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    InSync {
        app_id: String,
    },
    SavedToCloud {
        app_id: String,
        model_uploaded: bool,
    },
    LoadedToDevice {
        app_id: String,
        model: Option<DownloadOutcome>,
    },
    Created {
        app_id: String,
    },
    /// Nothing was written; the user still has to pick a side
    NeedsDecision {
        app_id: String,
        decision: ReconciliationDecision,
    },
}

impl SyncOutcome {
    pub fn app_id(&self) -> &str {
        match self {
            SyncOutcome::InSync { app_id }
            | SyncOutcome::SavedToCloud { app_id, .. }
            | SyncOutcome::LoadedToDevice { app_id, .. }
            | SyncOutcome::Created { app_id }
            | SyncOutcome::NeedsDecision { app_id, .. } => app_id,
        }
    }
}

pub struct Reconciler {
    device: Arc<dyn DeviceApi>,
    flows: Arc<dyn FlowEngineApi>,
    cloud: Arc<dyn CloudApi>,
    transfer: ModelTransfer,
}

impl Reconciler {
    pub fn new(collaborators: &Collaborators, preset_model_ids: Vec<String>) -> Self {
        Self {
            device: collaborators.device.clone(),
            flows: collaborators.flows.clone(),
            cloud: collaborators.cloud.clone(),
            transfer: ModelTransfer::new(
                collaborators.device.clone(),
                collaborators.cloud.clone(),
                collaborators.blobs.clone(),
                preset_model_ids,
            ),
        }
    }

    pub fn transfer(&self) -> &ModelTransfer {
        &self.transfer
    }

    /// Running flow, its revision and the model it runs
    pub async fn read_local(&self) -> Result<LocalState, AgentError> {
        let snapshot = self.flows.get_flows().await?;
        let model = self.flow_model(&snapshot.flow).await?;
        Ok(LocalState {
            flow: snapshot.flow,
            revision: snapshot.rev,
            model,
        })
    }

    /// The cloud record for `app_id`, or `None` if the platform no longer
    /// knows it. Transport failures are errors.
    pub async fn fetch_cloud(&self, app_id: &str) -> Result<Option<CloudApplication>, AgentError> {
        match self.cloud.view_app(app_id).await {
            Ok(app) => Ok(Some(app)),
            Err(AgentError::NotFound(msg)) | Err(AgentError::RejectedByServer { message: msg, .. }) => {
                debug!("Application {} not available: {}", app_id, msg);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite the cloud record with the device state
    pub async fn save_local_to_cloud(
        &self,
        binding: &mut Binding,
        app: &CloudApplication,
    ) -> Result<SyncOutcome, AgentError> {
        let mut fsm = ReconcileFsm::new();
        let result: Result<_, AgentError> = async {
            fsm.process(ReconcileEvent::Compare)?;
            let local = self.read_local().await?;
            self.save_steps(&mut fsm, binding, app, &local).await
        }
        .await;
        finish(&mut fsm, result)
    }

    /// Overwrite the device with the cloud record
    pub async fn load_cloud_to_local(
        &self,
        binding: &mut Binding,
        app: &CloudApplication,
    ) -> Result<SyncOutcome, AgentError> {
        let mut fsm = ReconcileFsm::new();
        let result: Result<_, AgentError> = async {
            fsm.process(ReconcileEvent::Compare)?;
            self.load_steps(&mut fsm, binding, app).await
        }
        .await;
        finish(&mut fsm, result)
    }

    /// Create a cloud record from the device state and bind to it.
    /// Missing inputs are read from the device. Never downloads a model.
    pub async fn create_from_local(
        &self,
        binding: &mut Binding,
        name: Option<String>,
        flow: Option<FlowDocument>,
        model: Option<ModelDescriptor>,
    ) -> Result<SyncOutcome, AgentError> {
        let mut fsm = ReconcileFsm::new();
        let result: Result<_, AgentError> = async {
            fsm.process(ReconcileEvent::Compare)?;
            let record = self.create_steps(&mut fsm, name, flow, model).await?;
            self.run_on_device(binding, &record).await?;

            fsm.process(ReconcileEvent::Done)?;
            info!("Created and bound application {}", record.app_id);
            Ok(SyncOutcome::Created {
                app_id: record.app_id,
            })
        }
        .await;
        finish(&mut fsm, result)
    }

    /// Bind a freshly created `record` whose model is already on the
    /// device: only its flow is pushed
    pub async fn bind_created(
        &self,
        binding: &mut Binding,
        record: &CloudApplication,
    ) -> Result<SyncOutcome, AgentError> {
        let mut fsm = ReconcileFsm::new();
        let result: Result<_, AgentError> = async {
            fsm.process(ReconcileEvent::Compare)?;
            fsm.process(ReconcileEvent::Apply)?;
            self.run_on_device(binding, record).await?;

            fsm.process(ReconcileEvent::Done)?;
            info!("Bound new application {}", record.app_id);
            Ok(SyncOutcome::Created {
                app_id: record.app_id.clone(),
            })
        }
        .await;
        finish(&mut fsm, result)
    }

    /// Create a cloud record from the device state without binding it or
    /// touching the engine
    pub async fn create_record(
        &self,
        name: Option<String>,
        flow: Option<FlowDocument>,
        model: Option<ModelDescriptor>,
    ) -> Result<CloudApplication, AgentError> {
        let mut fsm = ReconcileFsm::new();
        let result: Result<_, AgentError> = async {
            fsm.process(ReconcileEvent::Compare)?;
            let record = self.create_steps(&mut fsm, name, flow, model).await?;
            fsm.process(ReconcileEvent::Done)?;
            Ok(record)
        }
        .await;
        finish(&mut fsm, result)
    }

    /// Bring the device and the bound application together. Differences
    /// are never settled without an answer from `prompter`.
    pub async fn check_and_sync(
        &self,
        binding: &mut Binding,
        prompter: &dyn Prompter,
    ) -> Result<SyncOutcome, AgentError> {
        let bound_id = binding.app_id().map(str::to_string);
        let app = match bound_id {
            Some(app_id) => {
                let app = self.fetch_cloud(&app_id).await?;
                if app.is_none() {
                    warn!("Bound application {} is gone from the cloud", app_id);
                }
                app
            }
            None => None,
        };

        let Some(app) = app else {
            info!("No bound application, creating one from the device");
            return self.create_from_local(binding, None, None, None).await;
        };

        let mut fsm = ReconcileFsm::new();
        let result: Result<_, AgentError> = async {
            fsm.process(ReconcileEvent::Compare)?;
            let local = self.read_local().await?;
            let local_model = local.model_descriptor();

            if is_equivalent(&local.flow, local_model.as_ref(), &app) {
                fsm.process(ReconcileEvent::Matched)?;
                binding.bind(app.clone(), local.revision.clone());
                fsm.process(ReconcileEvent::Done)?;
                debug!("Application {} in sync", app.app_id);
                return Ok(SyncOutcome::InSync {
                    app_id: app.app_id.clone(),
                });
            }

            let decision = decide(&local.flow, local_model.as_ref(), &app, binding.app());
            fsm.process(ReconcileEvent::Diverged)?;
            info!("Application {} diverged: {:?}", app.app_id, decision);

            match prompter.choose_side(&app, decision).await {
                Some(Prefer::Local) => self.save_steps(&mut fsm, binding, &app, &local).await,
                Some(Prefer::Cloud) => self.load_steps(&mut fsm, binding, &app).await,
                None => {
                    fsm.process(ReconcileEvent::Undecided)?;
                    Ok(SyncOutcome::NeedsDecision {
                        app_id: app.app_id.clone(),
                        decision,
                    })
                }
            }
        }
        .await;
        finish(&mut fsm, result)
    }

    /// Runs from `Comparing` or `NeedsUserDecision`
    async fn save_steps(
        &self,
        fsm: &mut ReconcileFsm,
        binding: &mut Binding,
        app: &CloudApplication,
        local: &LocalState,
    ) -> Result<SyncOutcome, AgentError> {
        let local_model = local.model_descriptor();

        if is_equivalent(&local.flow, local_model.as_ref(), app) {
            fsm.process(ReconcileEvent::Matched)?;
            binding.bind(app.clone(), local.revision.clone());
            fsm.process(ReconcileEvent::Done)?;
            debug!("Application {} already matches the device", app.app_id);
            return Ok(SyncOutcome::InSync {
                app_id: app.app_id.clone(),
            });
        }

        let uploaded = match &local_model {
            Some(model) if needs_upload(model, app.model_data.as_ref()) => {
                fsm.process(ReconcileEvent::NeedsUpload)?;
                self.transfer
                    .upload_to_cloud(&app.app_id, model, app.model_data.as_ref())
                    .await?
            }
            _ => None,
        };
        fsm.process(ReconcileEvent::Apply)?;

        let model_uploaded = uploaded.is_some();
        let model_data = uploaded.or(local_model);
        self.cloud
            .update_app(&AppUpdate {
                app_id: app.app_id.clone(),
                flow_data: Some(local.flow.clone()),
                model_data: model_data.clone(),
                ..Default::default()
            })
            .await?;

        let mut saved = app.clone();
        saved.flow_data = local.flow.clone();
        if model_data.is_some() {
            saved.model_data = model_data;
        }
        binding.bind(saved, local.revision.clone());

        fsm.process(ReconcileEvent::Done)?;
        info!("Saved device state to application {}", app.app_id);
        Ok(SyncOutcome::SavedToCloud {
            app_id: app.app_id.clone(),
            model_uploaded,
        })
    }

    /// Runs from `Comparing` or `NeedsUserDecision`
    async fn load_steps(
        &self,
        fsm: &mut ReconcileFsm,
        binding: &mut Binding,
        app: &CloudApplication,
    ) -> Result<SyncOutcome, AgentError> {
        fsm.process(ReconcileEvent::Apply)?;

        let model = match &app.model_data {
            Some(model) => Some(self.transfer.ensure_on_device(model).await?),
            None => None,
        };

        self.run_on_device(binding, app).await?;

        fsm.process(ReconcileEvent::Done)?;
        info!("Loaded application {} onto the device", app.app_id);
        Ok(SyncOutcome::LoadedToDevice {
            app_id: app.app_id.clone(),
            model,
        })
    }

    /// Runs from `Comparing`, leaves the FSM in `Applying`
    async fn create_steps(
        &self,
        fsm: &mut ReconcileFsm,
        name: Option<String>,
        flow: Option<FlowDocument>,
        model: Option<ModelDescriptor>,
    ) -> Result<CloudApplication, AgentError> {
        let flow = match flow {
            Some(flow) => flow,
            None => self.flows.get_flows().await?.flow,
        };
        let model = match model {
            Some(model) => Some(model),
            None => self
                .flow_model(&flow)
                .await?
                .as_ref()
                .and_then(LocalModel::to_descriptor),
        };
        let name = name
            .or_else(|| flow.name())
            .unwrap_or_else(|| UNTITLED_APP.to_string());

        let app_id = self
            .cloud
            .create_app(&AppDraft {
                app_name: Some(name.clone()),
                flow_data: Some(flow.clone()),
                model_data: model.clone(),
            })
            .await?;
        info!("Created application {} ({})", name, app_id);
        let mut record = self.cloud.view_app(&app_id).await?;

        if let Some(model) = model.filter(|m| needs_upload(m, record.model_data.as_ref())) {
            fsm.process(ReconcileEvent::NeedsUpload)?;
            let uploaded = self
                .transfer
                .upload_to_cloud(&app_id, &model, record.model_data.as_ref())
                .await?;
            if let Some(uploaded) = uploaded {
                self.cloud
                    .update_app(&AppUpdate {
                        app_id: app_id.clone(),
                        flow_data: Some(flow),
                        model_data: Some(uploaded.clone()),
                        ..Default::default()
                    })
                    .await?;
                record.model_data = Some(uploaded);
            }
        }
        fsm.process(ReconcileEvent::Apply)?;
        Ok(record)
    }

    /// Push the flow of `app`, bind it and make sure the engine runs
    async fn run_on_device(
        &self,
        binding: &mut Binding,
        app: &CloudApplication,
    ) -> Result<(), AgentError> {
        let revision = self.flows.save_flows(&app.flow_data).await?;
        binding.bind(app.clone(), Some(revision));
        self.ensure_engine_started().await
    }

    /// The installed model, if `flow` runs one
    async fn flow_model(&self, flow: &FlowDocument) -> Result<Option<LocalModel>, AgentError> {
        if !flow.has_model_node() {
            return Ok(None);
        }
        self.device.get_local_model().await.map(Some)
    }

    async fn ensure_engine_started(&self) -> Result<(), AgentError> {
        if self.flows.get_state().await? == EngineState::Stop {
            self.flows.set_state(EngineState::Start).await?;
            info!("Flow engine started");
        }
        Ok(())
    }
}

/// Move the FSM to `Failed` if `result` is an error
fn finish<T>(fsm: &mut ReconcileFsm, result: Result<T, AgentError>) -> Result<T, AgentError> {
    if let Err(e) = &result {
        let state = fsm.state();
        if fsm.process(ReconcileEvent::Fail(e.to_string())).is_ok() {
            warn!("Reconciliation abandoned while {:?}: {}", state, e);
            let _ = fsm.process(ReconcileEvent::Reset);
        }
    }
    result
}
