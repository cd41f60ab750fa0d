//! Device-management API client

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::AgentError;
use crate::http::api::{DeviceApi, ModelUpload, SystemApi};
use crate::http::client::{ApiEnvelope, HttpClient};
use crate::models::device::{
    ChannelMode, DeviceInfo, LocalModel, ModelInfoResponse, ServiceStatusReport, UpdateProgress,
    UpdateVersionInfo,
};
use crate::models::model::ModelDescriptor;
use crate::models::platform::{PlatformInfo, PlatformInfoEnvelope};

const MODEL_INFO: &str = "api/deviceMgr/getModelInfo";
const MODEL_FILE: &str = "api/deviceMgr/getModelFile";
const UPLOAD_MODEL: &str = "api/deviceMgr/uploadModel";
const GET_PLATFORM_INFO: &str = "api/deviceMgr/getPlatformInfo";
const SAVE_PLATFORM_INFO: &str = "api/deviceMgr/savePlatformInfo";
const DEVICE_INFO: &str = "api/deviceMgr/queryDeviceInfo";
const SERVICE_STATUS: &str = "api/deviceMgr/queryServiceStatus";
const UPDATE_VERSION_INFO: &str = "api/deviceMgr/getSystemUpdateVesionInfo";
const UPDATE_SYSTEM: &str = "api/deviceMgr/updateSystem";
const UPDATE_PROGRESS: &str = "api/deviceMgr/getUpdateProgress";
const CANCEL_UPDATE: &str = "api/deviceMgr/cancelUpdate";

/// Client for the on-device management service
pub struct DeviceClient {
    http: HttpClient,
    token: Option<SecretString>,
}

impl DeviceClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, AgentError> {
        Ok(Self {
            http: HttpClient::new(base_url)?,
            token: token.map(SecretString::from),
        })
    }

    fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }
}

#[async_trait]
impl DeviceApi for DeviceClient {
    async fn get_local_model(&self) -> Result<LocalModel, AgentError> {
        let envelope: ApiEnvelope<ModelInfoResponse> =
            self.http.get(MODEL_INFO, &[], self.token()).await?;

        // A device without a model answers with a non-zero code
        if !envelope.is_ok() {
            debug!("Device reports no installed model");
            return Ok(LocalModel::default());
        }
        let Some(info) = envelope.data else {
            return Ok(LocalModel::default());
        };

        let descriptor = match info.model_info.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => match serde_json::from_str::<ModelDescriptor>(raw) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    warn!("Unreadable model description on device: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(LocalModel {
            descriptor,
            checksum: info.model_md5.filter(|s| !s.is_empty()),
        })
    }

    async fn get_model_file(&self) -> Result<Vec<u8>, AgentError> {
        self.http.get_bytes(MODEL_FILE, self.token()).await
    }

    async fn upload_model(&self, upload: ModelUpload) -> Result<(), AgentError> {
        let mut form = Form::new();
        if let Some(binary) = upload.binary {
            form = form.part("model_file", Part::bytes(binary).file_name("model_file"));
        }
        form = form.text("model_info", serde_json::to_string(&upload.descriptor)?);

        let envelope: ApiEnvelope<serde_json::Value> =
            self.http.post_multipart(UPLOAD_MODEL, self.token(), form).await?;
        envelope.into_result().map(|_| ())
    }

    async fn get_platform_info(&self) -> Result<Option<PlatformInfo>, AgentError> {
        let envelope: ApiEnvelope<PlatformInfoEnvelope> =
            self.http.get(GET_PLATFORM_INFO, &[], self.token()).await?;
        if !envelope.is_ok() {
            return Ok(None);
        }
        match envelope.data.and_then(|d| d.platform_info).filter(|s| !s.is_empty()) {
            Some(blob) => Ok(Some(PlatformInfo::decode(&blob)?)),
            None => Ok(None),
        }
    }

    async fn save_platform_info(&self, info: &PlatformInfo) -> Result<(), AgentError> {
        let body = PlatformInfoEnvelope {
            platform_info: Some(info.encode()?),
        };
        let envelope: ApiEnvelope<serde_json::Value> =
            self.http.post(SAVE_PLATFORM_INFO, self.token(), &body).await?;
        envelope.into_result().map(|_| ())
    }
}

#[async_trait]
impl SystemApi for DeviceClient {
    async fn get_device_info(&self) -> Result<DeviceInfo, AgentError> {
        let envelope: ApiEnvelope<DeviceInfo> =
            self.http.get(DEVICE_INFO, &[], self.token()).await?;
        envelope.into_data("device info")
    }

    async fn get_service_status(&self) -> Result<ServiceStatusReport, AgentError> {
        let envelope: ApiEnvelope<ServiceStatusReport> =
            self.http.get(SERVICE_STATUS, &[], self.token()).await?;
        envelope.into_data("service status")
    }

    async fn get_update_version_info(
        &self,
        url: &str,
        channel: ChannelMode,
    ) -> Result<UpdateVersionInfo, AgentError> {
        let body = json!({ "url": url, "channel": i64::from(channel) });
        let envelope: ApiEnvelope<UpdateVersionInfo> =
            self.http.post(UPDATE_VERSION_INFO, self.token(), &body).await?;
        envelope.into_data("update version info")
    }

    async fn apply_system_update(&self, download_url: &str) -> Result<(), AgentError> {
        let body = json!({ "downloadUrl": download_url });
        let envelope: ApiEnvelope<serde_json::Value> =
            self.http.post(UPDATE_SYSTEM, self.token(), &body).await?;
        envelope.into_result().map(|_| ())
    }

    async fn get_update_progress(&self) -> Result<UpdateProgress, AgentError> {
        let envelope: ApiEnvelope<UpdateProgress> =
            self.http.get(UPDATE_PROGRESS, &[], self.token()).await?;
        envelope.into_data("update progress")
    }

    async fn cancel_update(&self) -> Result<(), AgentError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .post(CANCEL_UPDATE, self.token(), &json!({}))
            .await?;
        envelope.into_result().map(|_| ())
    }
}
