//! Cloud application platform client

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::authn::session::CloudSession;
use crate::errors::AgentError;
use crate::http::api::CloudApi;
use crate::http::client::{ApiEnvelope, HttpClient};
use crate::models::app::{
    AppDraft, AppId, AppList, AppUpdate, CloudApplication, CloudUser, ModelSnapshot, UploadTarget,
};
use crate::models::model::ModelDescriptor;

const USER_INFO: &str = "portalapi/user/getUserOrgInfo";
const REFRESH_TOKEN: &str = "portalapi/auth/refreshToken";
const LIST_APPS: &str = "aiserverapi/flow/application/list_app";
const VIEW_APP: &str = "aiserverapi/flow/application/view_app";
const CREATE_APP: &str = "aiserverapi/flow/application/create_app";
const UPDATE_APP: &str = "aiserverapi/flow/application/update_app";
const DELETE_APP: &str = "aiserverapi/flow/application/delete_app";
const ACQUIRE_FILE_URL: &str = "aiserverapi/user/acquire_file_url";
const REMOVE_FILE: &str = "aiserverapi/user/remove_file";
const APPLY_MODEL: &str = "aiserverapi/model/apply_model";

/// Storage class of model blobs
const MODEL_FILE_TYPE: &str = "3";
/// Deployment target of model snapshots
const MODEL_UNIFORM_TYPE: &str = "40";

/// Envelope codes meaning "token expired / invalid"
const EXPIRED_TOKEN_CODES: [&str; 2] = ["11101", "11102"];

#[derive(Debug, Deserialize)]
struct RefreshedToken {
    token: String,
}

/// Client for the cloud platform. Requests go to the portal or the
/// application server depending on their path prefix.
pub struct CloudClient {
    portal: HttpClient,
    app_server: HttpClient,
    session: Arc<CloudSession>,
}

impl CloudClient {
    pub fn new(
        portal_url: &str,
        app_server_url: &str,
        session: Arc<CloudSession>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            portal: HttpClient::new(portal_url)?,
            app_server: HttpClient::new(app_server_url)?,
            session,
        })
    }

    pub fn session(&self) -> &Arc<CloudSession> {
        &self.session
    }

    /// Run `op` with the current token. If the platform says the token
    /// expired, refresh once and replay.
    async fn authed<T, F, Fut>(&self, op: F) -> Result<ApiEnvelope<T>, AgentError>
    where
        F: Fn(Option<String>) -> Fut,
        Fut: Future<Output = Result<ApiEnvelope<T>, AgentError>>,
    {
        let envelope = op(self.session.token().await).await?;
        if !EXPIRED_TOKEN_CODES.contains(&envelope.code.0.as_str()) {
            return Ok(envelope);
        }

        debug!("Cloud token expired (code {}), refreshing", envelope.code.0);
        let token = self.refresh().await?;
        op(Some(token)).await
    }

    /// Exchange the refresh token for a new session token
    pub async fn refresh(&self) -> Result<String, AgentError> {
        let (Some(token), Some(refresh_token)) = (
            self.session.token().await,
            self.session.refresh_token().await,
        ) else {
            return Err(AgentError::rejected(
                "unauthenticated",
                "no cloud session to refresh, sign in again",
            ));
        };

        let envelope: ApiEnvelope<RefreshedToken> = self
            .portal
            .get(
                REFRESH_TOKEN,
                &[("refreshToken", refresh_token.as_str())],
                Some(&token),
            )
            .await?;

        match envelope.into_data("token") {
            Ok(refreshed) => {
                self.session.set_token(refreshed.token.clone()).await;
                info!("Cloud token refreshed");
                Ok(refreshed.token)
            }
            Err(e) => {
                error!("Cloud token refresh failed: {}", e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl CloudApi for CloudClient {
    async fn user_info(&self) -> Result<CloudUser, AgentError> {
        let portal = &self.portal;
        self.authed(|token| async move { portal.get(USER_INFO, &[], token.as_deref()).await })
            .await?
            .into_data("user info")
    }

    async fn list_apps(&self) -> Result<Vec<CloudApplication>, AgentError> {
        let server = &self.app_server;
        let list: Option<AppList> = self
            .authed(|token| async move { server.get(LIST_APPS, &[], token.as_deref()).await })
            .await?
            .into_result()?;
        Ok(list.map(|l| l.list).unwrap_or_default())
    }

    async fn view_app(&self, app_id: &str) -> Result<CloudApplication, AgentError> {
        let server = &self.app_server;
        self.authed(|token| async move {
            server
                .get(VIEW_APP, &[("app_id", app_id)], token.as_deref())
                .await
        })
        .await?
        .into_data("application")
    }

    async fn create_app(&self, draft: &AppDraft) -> Result<String, AgentError> {
        let server = &self.app_server;
        let created: AppId = self
            .authed(|token| async move { server.post(CREATE_APP, token.as_deref(), draft).await })
            .await?
            .into_data("app_id")?;
        Ok(created.app_id)
    }

    async fn update_app(&self, update: &AppUpdate) -> Result<(), AgentError> {
        let server = &self.app_server;
        self.authed::<serde_json::Value, _, _>(|token| async move {
            server.post(UPDATE_APP, token.as_deref(), update).await
        })
        .await?
        .into_result()
        .map(|_| ())
    }

    async fn delete_app(&self, app_id: &str) -> Result<(), AgentError> {
        let server = &self.app_server;
        let body = json!({ "app_id": app_id });
        let body = &body;
        self.authed::<serde_json::Value, _, _>(|token| async move {
            server.post(DELETE_APP, token.as_deref(), body).await
        })
        .await?
        .into_result()
        .map(|_| ())
    }

    async fn acquire_upload_target(&self, object_name: &str) -> Result<UploadTarget, AgentError> {
        let server = &self.app_server;
        self.authed(|token| async move {
            server
                .get(
                    ACQUIRE_FILE_URL,
                    &[("file_name", object_name), ("file_type", MODEL_FILE_TYPE)],
                    token.as_deref(),
                )
                .await
        })
        .await?
        .into_data("upload target")
    }

    async fn remove_file(&self, object_name: &str) -> Result<(), AgentError> {
        let server = &self.app_server;
        let body = json!({ "file_name": object_name, "file_type": 3 });
        let body = &body;
        self.authed::<serde_json::Value, _, _>(|token| async move {
            server.post(REMOVE_FILE, token.as_deref(), body).await
        })
        .await?
        .into_result()
        .map(|_| ())
    }

    async fn apply_model(&self, model_id: &str) -> Result<ModelDescriptor, AgentError> {
        let server = &self.app_server;
        let snapshot: ModelSnapshot = self
            .authed(|token| async move {
                server
                    .get(
                        APPLY_MODEL,
                        &[("model_id", model_id), ("uniform_type", MODEL_UNIFORM_TYPE)],
                        token.as_deref(),
                    )
                    .await
            })
            .await?
            .into_data("model snapshot")?;
        snapshot
            .model_snapshot
            .ok_or_else(|| AgentError::NotFound(format!("model {} has no snapshot", model_id)))
    }
}
