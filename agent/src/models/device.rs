//! Device-management API models

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::model::ModelDescriptor;

/// Device identity and OS information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceInfo {
    pub device_name: String,
    pub app_name: String,
    pub ip: String,
    pub sn: String,
    pub os_name: String,
    pub os_version: String,
    pub channel: ChannelMode,
    pub server_url: String,
    pub official_url: String,
}

impl DeviceInfo {
    /// URL the update check is sent against for the selected channel
    pub fn update_url(&self) -> &str {
        match self.channel {
            ChannelMode::Official => &self.official_url,
            ChannelMode::Custom => &self.server_url,
        }
    }
}

/// Update channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ChannelMode {
    #[default]
    Official,
    Custom,
}

impl From<i64> for ChannelMode {
    fn from(value: i64) -> Self {
        if value == 1 {
            ChannelMode::Custom
        } else {
            ChannelMode::Official
        }
    }
}

impl From<ChannelMode> for i64 {
    fn from(value: ChannelMode) -> Self {
        match value {
            ChannelMode::Official => 0,
            ChannelMode::Custom => 1,
        }
    }
}

/// Status code of one on-device service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ServiceStatus {
    Running,
    #[default]
    Starting,
    Failed,
    Error,
}

impl From<i64> for ServiceStatus {
    fn from(value: i64) -> Self {
        match value {
            0 => ServiceStatus::Running,
            1 => ServiceStatus::Starting,
            2 => ServiceStatus::Failed,
            _ => ServiceStatus::Error,
        }
    }
}

impl From<ServiceStatus> for i64 {
    fn from(value: ServiceStatus) -> Self {
        match value {
            ServiceStatus::Running => 0,
            ServiceStatus::Starting => 1,
            ServiceStatus::Failed => 2,
            ServiceStatus::Error => 4,
        }
    }
}

/// Answer of `queryServiceStatus`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStatusReport {
    pub sscma_node: ServiceStatus,
    pub node_red: ServiceStatus,
    pub system: ServiceStatus,
    /// Milliseconds since boot
    pub uptime: u64,
}

impl ServiceStatusReport {
    pub fn all_running(&self) -> bool {
        self.sscma_node == ServiceStatus::Running
            && self.node_red == ServiceStatus::Running
            && self.system == ServiceStatus::Running
    }
}

/// Answer of `getSystemUpdateVesionInfo`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateVersionInfo {
    pub os_name: String,
    pub os_version: String,
    pub download_url: String,
    #[serde(deserialize_with = "flag_from_int")]
    pub is_upgrading: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProgress {
    #[serde(default)]
    pub progress: f64,
}

/// Answer of `getModelInfo`. `model_info` is a JSON document inside a string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelInfoResponse {
    #[serde(default)]
    pub model_info: Option<String>,
    #[serde(default)]
    pub model_md5: Option<String>,
}

/// The model currently installed on the device
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalModel {
    pub descriptor: Option<ModelDescriptor>,
    pub checksum: Option<String>,
}

impl LocalModel {
    /// Descriptor with the device checksum folded in, as it would be
    /// recorded in the cloud
    pub fn to_descriptor(&self) -> Option<ModelDescriptor> {
        self.descriptor.clone().map(|mut model| {
            model.model_md5 = self.checksum.clone();
            model
        })
    }
}

fn flag_from_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    })
}
