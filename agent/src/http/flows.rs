//! Flow engine API client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AgentError;
use crate::http::api::FlowEngineApi;
use crate::http::client::HttpClient;
use crate::models::flow::{EngineState, FlowDocument, FlowSnapshot};

#[derive(Debug, Deserialize)]
struct FlowsResponse {
    #[serde(default)]
    rev: Option<String>,
    #[serde(default)]
    flows: Option<Vec<Value>>,
}

#[derive(Debug, Serialize)]
struct FlowsRequest {
    flows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RevisionResponse {
    rev: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateBody {
    state: EngineState,
}

/// Client for the engine's admin API (v2 flow format)
pub struct FlowEngineClient {
    http: HttpClient,
}

impl FlowEngineClient {
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        let mut headers = HeaderMap::new();
        headers.insert("Node-RED-API-Version", HeaderValue::from_static("v2"));
        Ok(Self {
            http: HttpClient::with_headers(base_url, headers)?,
        })
    }
}

#[async_trait]
impl FlowEngineApi for FlowEngineClient {
    async fn get_flows(&self) -> Result<FlowSnapshot, AgentError> {
        let response: FlowsResponse = self.http.get("flows", &[], None).await?;
        let nodes = response.flows.unwrap_or_default();
        Ok(FlowSnapshot {
            rev: response.rev,
            flow: FlowDocument::from_nodes(&nodes)?,
        })
    }

    async fn save_flows(&self, flow: &FlowDocument) -> Result<String, AgentError> {
        let body = FlowsRequest {
            flows: flow.raw_nodes()?,
        };
        let response: RevisionResponse = self.http.post("flows", None, &body).await?;
        Ok(response.rev)
    }

    async fn get_state(&self) -> Result<EngineState, AgentError> {
        let body: StateBody = self.http.get("flows/state", &[], None).await?;
        Ok(body.state)
    }

    async fn set_state(&self, state: EngineState) -> Result<(), AgentError> {
        self.http
            .post_unit("flows/state", None, &StateBody { state })
            .await
    }
}
