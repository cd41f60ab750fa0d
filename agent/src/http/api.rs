//! Collaborator contracts
//!
//! The reconciler only talks to these traits; `http::{device, flows, cloud,
//! blob}` implement them over HTTP and the tests implement them in memory.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::errors::AgentError;
use crate::models::app::{AppDraft, AppUpdate, CloudApplication, CloudUser, UploadTarget};
use crate::models::device::{
    ChannelMode, DeviceInfo, LocalModel, ServiceStatusReport, UpdateProgress, UpdateVersionInfo,
};
use crate::models::flow::{EngineState, FlowDocument, FlowSnapshot};
use crate::models::model::ModelDescriptor;
use crate::models::platform::PlatformInfo;

/// A model pushed to the device in one multipart request
#[derive(Debug, Clone)]
pub struct ModelUpload {
    /// `None` for firmware presets: only the description changes
    pub binary: Option<Vec<u8>>,
    pub descriptor: ModelDescriptor,
}

/// Device-side model storage and the platform info blob
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Installed model descriptor and checksum
    async fn get_local_model(&self) -> Result<LocalModel, AgentError>;

    /// Binary of the installed model
    async fn get_model_file(&self) -> Result<Vec<u8>, AgentError>;

    async fn upload_model(&self, upload: ModelUpload) -> Result<(), AgentError>;

    /// `None` when nothing has been saved yet
    async fn get_platform_info(&self) -> Result<Option<PlatformInfo>, AgentError>;

    async fn save_platform_info(&self, info: &PlatformInfo) -> Result<(), AgentError>;
}

/// Device system management (identity, services, OS updates)
#[async_trait]
pub trait SystemApi: Send + Sync {
    async fn get_device_info(&self) -> Result<DeviceInfo, AgentError>;

    async fn get_service_status(&self) -> Result<ServiceStatusReport, AgentError>;

    async fn get_update_version_info(
        &self,
        url: &str,
        channel: ChannelMode,
    ) -> Result<UpdateVersionInfo, AgentError>;

    async fn apply_system_update(&self, download_url: &str) -> Result<(), AgentError>;

    async fn get_update_progress(&self) -> Result<UpdateProgress, AgentError>;

    async fn cancel_update(&self) -> Result<(), AgentError>;
}

/// The local flow engine
#[async_trait]
pub trait FlowEngineApi: Send + Sync {
    async fn get_flows(&self) -> Result<FlowSnapshot, AgentError>;

    /// Deploy `flow`, returning the new revision
    async fn save_flows(&self, flow: &FlowDocument) -> Result<String, AgentError>;

    async fn get_state(&self) -> Result<EngineState, AgentError>;

    async fn set_state(&self, state: EngineState) -> Result<(), AgentError>;
}

/// The cloud application platform
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn user_info(&self) -> Result<CloudUser, AgentError>;

    async fn list_apps(&self) -> Result<Vec<CloudApplication>, AgentError>;

    async fn view_app(&self, app_id: &str) -> Result<CloudApplication, AgentError>;

    /// Returns the id of the new record
    async fn create_app(&self, draft: &AppDraft) -> Result<String, AgentError>;

    async fn update_app(&self, update: &AppUpdate) -> Result<(), AgentError>;

    async fn delete_app(&self, app_id: &str) -> Result<(), AgentError>;

    async fn acquire_upload_target(&self, object_name: &str) -> Result<UploadTarget, AgentError>;

    async fn remove_file(&self, object_name: &str) -> Result<(), AgentError>;

    /// Deployable snapshot of a published model
    async fn apply_model(&self, model_id: &str) -> Result<ModelDescriptor, AgentError>;
}

/// Raw object storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, AgentError>;

    async fn put(&self, upload_url: &str, bytes: Vec<u8>) -> Result<(), AgentError>;
}

/// Every collaborator the agent talks to
#[derive(Clone)]
pub struct Collaborators {
    pub device: Arc<dyn DeviceApi>,
    pub system: Arc<dyn SystemApi>,
    pub flows: Arc<dyn FlowEngineApi>,
    pub cloud: Arc<dyn CloudApi>,
    pub blobs: Arc<dyn BlobStore>,
}
