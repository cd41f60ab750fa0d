//! Flow documents exchanged with the flow engine and the cloud

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::errors::AgentError;

pub const TAB_NODE: &str = "tab";
pub const MODEL_NODE: &str = "model";
pub const DASHBOARD_NODE: &str = "ui-base";

/// A flow as text. Two documents are compared on their text only; the node
/// list is parsed on demand when a caller needs to look inside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowDocument {
    text: String,
}

impl FlowDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The engine's "no flow" representation
    pub fn empty() -> Self {
        Self::new("[]")
    }

    /// Build from the raw node array returned by the flow engine.
    /// Serialisation is compact and keeps each node's key order.
    pub fn from_nodes(nodes: &[Value]) -> Result<Self, AgentError> {
        Ok(Self::new(serde_json::to_string(nodes)?))
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// `""` and `"[]"` both mean "no flow"
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() || self.text == "[]"
    }

    /// Raw node values, ready to be pushed to the engine
    pub fn raw_nodes(&self) -> Result<Vec<Value>, AgentError> {
        if self.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(&self.text)?;
        match value {
            Value::Array(nodes) => Ok(nodes),
            Value::Null => Ok(Vec::new()),
            other => Err(AgentError::ValidationError(format!(
                "flow must be a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn nodes(&self) -> Result<Vec<FlowNode>, AgentError> {
        Ok(self.raw_nodes()?.iter().map(FlowNode::from_value).collect())
    }

    pub fn has_model_node(&self) -> bool {
        self.nodes()
            .map(|nodes| nodes.iter().any(|n| matches!(n, FlowNode::Model { .. })))
            .unwrap_or(false)
    }

    /// Whether the flow serves a visual dashboard
    pub fn has_dashboard(&self) -> bool {
        self.nodes()
            .map(|nodes| nodes.iter().any(|n| matches!(n, FlowNode::UiBase { .. })))
            .unwrap_or(false)
    }

    /// Label of the first tab, used as the application name
    pub fn name(&self) -> Option<String> {
        self.nodes().ok()?.into_iter().find_map(|n| match n {
            FlowNode::Tab { label, .. } => label,
            _ => None,
        })
    }
}

impl From<&str> for FlowDocument {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl Serialize for FlowDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for FlowDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?;
        Ok(Self::new(text.unwrap_or_default()))
    }
}

/// A single node, discriminated by its `type` field. Unknown types keep
/// their raw JSON so nothing is lost when the document is re-emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowNode {
    Tab { id: String, label: Option<String> },
    Model { id: String, model: Option<String> },
    UiBase { id: String },
    Other { node_type: Option<String>, raw: Value },
}

impl FlowNode {
    pub fn from_value(value: &Value) -> Self {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let string_field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

        match value.get("type").and_then(Value::as_str) {
            Some(TAB_NODE) => FlowNode::Tab {
                id,
                label: string_field("label"),
            },
            Some(MODEL_NODE) => FlowNode::Model {
                id,
                model: string_field("model"),
            },
            Some(DASHBOARD_NODE) => FlowNode::UiBase { id },
            other => FlowNode::Other {
                node_type: other.map(str::to_string),
                raw: value.clone(),
            },
        }
    }

    pub fn node_type(&self) -> Option<&str> {
        match self {
            FlowNode::Tab { .. } => Some(TAB_NODE),
            FlowNode::Model { .. } => Some(MODEL_NODE),
            FlowNode::UiBase { .. } => Some(DASHBOARD_NODE),
            FlowNode::Other { node_type, .. } => node_type.as_deref(),
        }
    }
}

impl<'de> Deserialize<'de> for FlowNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(FlowNode::from_value(&value))
    }
}

/// The flow currently deployed on the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSnapshot {
    /// Revision token assigned by the engine on every deploy
    pub rev: Option<String>,
    pub flow: FlowDocument,
}

/// Run state of the flow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Start,
    Stop,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
