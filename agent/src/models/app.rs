//! Cloud application records

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::models::flow::FlowDocument;
use crate::models::model::ModelDescriptor;

/// An application stored on the cloud platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudApplication {
    pub app_id: String,

    #[serde(default)]
    pub app_name: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub flow_data: FlowDocument,

    #[serde(default)]
    pub model_data: Option<ModelDescriptor>,

    #[serde(default)]
    pub res_url: Option<String>,

    /// Creation time, epoch milliseconds
    #[serde(default)]
    pub created: i64,

    /// Last update time, epoch milliseconds
    #[serde(default)]
    pub updated: i64,
}

impl CloudApplication {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created).single()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.updated).single()
    }
}

/// Body of `create_app`
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppDraft {
    pub app_name: Option<String>,
    pub flow_data: Option<FlowDocument>,
    pub model_data: Option<ModelDescriptor>,
}

/// Body of `update_app`; absent fields are left untouched by the platform
#[derive(Debug, Clone, Default, Serialize)]
pub struct AppUpdate {
    pub app_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_data: Option<FlowDocument>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_data: Option<ModelDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppId {
    pub app_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppList {
    #[serde(default)]
    pub list: Vec<CloudApplication>,
}

/// Signed upload target for a blob in cloud storage
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadTarget {
    /// Where to PUT the bytes
    pub upload_url: String,

    /// Where the blob is readable afterwards
    pub file_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSnapshot {
    pub model_snapshot: Option<ModelDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudUser {
    #[serde(default)]
    pub nickname: String,
}
