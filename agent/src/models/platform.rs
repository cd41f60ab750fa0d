//! Platform info blob persisted on the device
//!
//! The device stores it as an opaque string. It carries the cloud session
//! and the snapshot of the application bound to the device.

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::models::app::CloudApplication;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default, rename = "refreshToken")]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlatformInfo {
    pub user_info: UserInfo,
    pub app_info: Option<CloudApplication>,
}

/// On-device shape: `app_info` is itself a JSON string
#[derive(Serialize, Deserialize)]
struct PlatformInfoWire {
    #[serde(default)]
    user_info: UserInfo,
    #[serde(default)]
    app_info: Option<String>,
}

impl PlatformInfo {
    /// Parse the blob. A malformed `app_info` is treated as "no binding".
    pub fn decode(blob: &str) -> Result<Self, AgentError> {
        let wire: PlatformInfoWire = serde_json::from_str(blob)?;
        let app_info = wire
            .app_info
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Option<CloudApplication>>(raw).ok())
            .flatten();
        Ok(Self {
            user_info: wire.user_info,
            app_info,
        })
    }

    pub fn encode(&self) -> Result<String, AgentError> {
        let wire = PlatformInfoWire {
            user_info: self.user_info.clone(),
            app_info: Some(serde_json::to_string(&self.app_info)?),
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

/// Body of `savePlatformInfo` and payload of `getPlatformInfo`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformInfoEnvelope {
    #[serde(default)]
    pub platform_info: Option<String>,
}
