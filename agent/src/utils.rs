//! Utility functions

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::AgentError;

/// Version information for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Append a `timestamp` query parameter so intermediate caches never serve a
/// stale model binary
pub fn cache_bust(raw_url: &str, timestamp_ms: i64) -> Result<Url, AgentError> {
    let mut url = Url::parse(raw_url)
        .map_err(|e| AgentError::ValidationError(format!("invalid url {}: {}", raw_url, e)))?;
    url.query_pairs_mut()
        .append_pair("timestamp", &timestamp_ms.to_string());
    Ok(url)
}

/// Join a base URL and a relative API path with exactly one slash
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
