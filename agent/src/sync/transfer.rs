//! Model binaries moving between the device and the cloud

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::http::api::{BlobStore, CloudApi, DeviceApi, ModelUpload};
use crate::models::model::ModelDescriptor;
use crate::utils::{cache_bust, now_millis};

/// What a download transfer ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The device already runs a binary with the same checksum
    AlreadyPresent,
    /// Firmware preset: only the description was pushed
    MetadataOnly,
    /// Binary fetched and pushed together with its description
    Downloaded,
    /// The descriptor points at no binary at all
    NoSource,
}

/// Whether the device model must be pushed to cloud storage before the
/// cloud record can reference it
pub fn needs_upload(local: &ModelDescriptor, cloud: Option<&ModelDescriptor>) -> bool {
    if !local.is_local() {
        return false;
    }
    match cloud {
        None => true,
        Some(cloud) => cloud.source_url().is_none() || cloud.checksum() != local.checksum(),
    }
}

pub struct ModelTransfer {
    device: Arc<dyn DeviceApi>,
    cloud: Arc<dyn CloudApi>,
    blobs: Arc<dyn BlobStore>,
    preset_model_ids: Vec<String>,
}

impl ModelTransfer {
    pub fn new(
        device: Arc<dyn DeviceApi>,
        cloud: Arc<dyn CloudApi>,
        blobs: Arc<dyn BlobStore>,
        preset_model_ids: Vec<String>,
    ) -> Self {
        Self {
            device,
            cloud,
            blobs,
            preset_model_ids,
        }
    }

    pub fn is_preset(&self, model_id: &str) -> bool {
        self.preset_model_ids.iter().any(|id| id == model_id)
    }

    /// Make the device run `model`. Either the whole upload lands on the
    /// device or the call fails; there is no partial apply.
    pub async fn ensure_on_device(
        &self,
        model: &ModelDescriptor,
    ) -> Result<DownloadOutcome, AgentError> {
        if let Some(checksum) = model.checksum() {
            let installed = self.device.get_local_model().await?;
            if installed.checksum.as_deref() == Some(checksum) {
                debug!("Model {} already on device", model.model_name);
                return Ok(DownloadOutcome::AlreadyPresent);
            }
        }

        if self.is_preset(&model.model_id) {
            self.device
                .upload_model(ModelUpload {
                    binary: None,
                    descriptor: model.clone(),
                })
                .await?;
            info!("Switched device to preset model {}", model.model_id);
            return Ok(DownloadOutcome::MetadataOnly);
        }

        let Some(source) = model.source_url() else {
            debug!("Model {} has no source, nothing to fetch", model.model_name);
            return Ok(DownloadOutcome::NoSource);
        };

        let url = cache_bust(source, now_millis())?;
        let binary = self.blobs.fetch(&url).await?;
        debug!("Fetched {} bytes of model {}", binary.len(), model.model_name);

        self.device
            .upload_model(ModelUpload {
                binary: Some(binary),
                descriptor: model.clone(),
            })
            .await?;
        info!("Installed model {} on device", model.model_name);
        Ok(DownloadOutcome::Downloaded)
    }

    /// Push the device binary to cloud storage for application `app_id`.
    ///
    /// Returns `None` when `cloud` already references the same binary,
    /// otherwise the descriptor rewritten to the public URL. The descriptor
    /// is only rewritten after the bytes are stored.
    pub async fn upload_to_cloud(
        &self,
        app_id: &str,
        local: &ModelDescriptor,
        cloud: Option<&ModelDescriptor>,
    ) -> Result<Option<ModelDescriptor>, AgentError> {
        if !needs_upload(local, cloud) {
            return Ok(None);
        }

        let binary = self.device.get_model_file().await?;
        let object_name = local.object_name(app_id);
        let target = self.cloud.acquire_upload_target(&object_name).await?;
        self.blobs.put(&target.upload_url, binary).await?;

        let mut uploaded = local.clone();
        uploaded.arguments.url = Some(target.file_url);
        info!("Uploaded model {} to cloud storage", object_name);
        Ok(Some(uploaded))
    }
}
