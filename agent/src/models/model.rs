//! Detection model descriptors

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `model_id` of a model whose binary lives on the device
pub const LOCAL_MODEL_ID: &str = "0";

/// Describes a detection model. Fields the agent never looks at
/// (framework, classes, author...) are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub model_id: String,

    #[serde(default)]
    pub model_name: String,

    /// Checksum of the binary
    #[serde(default)]
    pub model_md5: Option<String>,

    #[serde(default)]
    pub arguments: ModelArguments,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelDescriptor {
    pub fn new(model_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.model_md5 = Some(checksum.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.arguments.url = Some(url.into());
        self
    }

    /// Whether the binary is stored on the device rather than in the cloud
    pub fn is_local(&self) -> bool {
        self.model_id == LOCAL_MODEL_ID
    }

    pub fn checksum(&self) -> Option<&str> {
        self.model_md5.as_deref()
    }

    pub fn source_url(&self) -> Option<&str> {
        self.arguments.url.as_deref().filter(|url| !url.is_empty())
    }

    /// Object name of this model's blob in cloud storage
    pub fn object_name(&self, app_id: &str) -> String {
        format!("{}_{}", self.model_name, app_id)
    }
}
