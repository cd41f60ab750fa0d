//! HTTP client implementation

use std::time::Duration;

use reqwest::header::{self, HeaderMap};
use reqwest::{multipart, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

use crate::errors::AgentError;
use crate::utils::join_url;

/// Per-request timeout; there is no other timeout layer
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client bound to one collaborator's base URL
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self, AgentError> {
        Self::with_headers(base_url, HeaderMap::new())
    }

    /// Create a client that sends `headers` with every request
    pub fn with_headers(base_url: &str, headers: HeaderMap) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.header(header::AUTHORIZATION, token),
            None => request,
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        token: Option<&str>,
    ) -> Result<T, AgentError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let request = Self::authorize(self.client.get(&url).query(query), token);
        let response = Self::check("GET", &url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Make a GET request and return the raw body
    pub async fn get_bytes(&self, path: &str, token: Option<&str>) -> Result<Vec<u8>, AgentError> {
        let url = self.url(path);
        debug!("GET {} (binary)", url);

        let request = Self::authorize(self.client.get(&url), token);
        let response = Self::check("GET", &url, request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Make a POST request with a JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, AgentError> {
        let url = self.url(path);
        debug!("POST {}", url);

        let request = Self::authorize(self.client.post(&url).json(body), token);
        let response = Self::check("POST", &url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request whose answer body is irrelevant
    pub async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<(), AgentError> {
        let url = self.url(path);
        debug!("POST {}", url);

        let request = Self::authorize(self.client.post(&url).json(body), token);
        Self::check("POST", &url, request.send().await?).await?;
        Ok(())
    }

    /// Make a multipart POST request
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        form: multipart::Form,
    ) -> Result<T, AgentError> {
        let url = self.url(path);
        debug!("POST {} (multipart)", url);

        let request = Self::authorize(self.client.post(&url).multipart(form), token);
        let response = Self::check("POST", &url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn check(
        method: &str,
        url: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, AgentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        error!("HTTP {} {} failed: {} - {}", method, url, status, body);
        Err(AgentError::rejected(status.as_u16(), body))
    }
}

/// `{code, data, msg}` wrapper used by the device and cloud APIs
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: ResponseCode,

    #[serde(default = "Option::default")]
    pub data: Option<T>,

    #[serde(default)]
    pub msg: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }

    /// Unwrap the payload, turning a non-zero code into `RejectedByServer`
    pub fn into_result(self) -> Result<Option<T>, AgentError> {
        if self.code.is_ok() {
            Ok(self.data)
        } else {
            Err(AgentError::rejected(
                &self.code.0,
                self.msg.unwrap_or_default(),
            ))
        }
    }

    /// Like `into_result`, but a success without payload is an error
    pub fn into_data(self, what: &str) -> Result<T, AgentError> {
        self.into_result()?
            .ok_or_else(|| AgentError::NotFound(format!("{} missing from response", what)))
    }
}

/// Envelope code; the platforms send it as either a number or a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCode(pub String);

impl ResponseCode {
    pub fn is_ok(&self) -> bool {
        self.0 == "0"
    }
}

impl<'de> Deserialize<'de> for ResponseCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let code = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(serde::de::Error::custom(format!("bad code: {}", other))),
        };
        Ok(ResponseCode(code))
    }
}
