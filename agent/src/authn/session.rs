//! Cloud session tokens

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::info;

use crate::models::platform::UserInfo;

#[derive(Default)]
struct SessionTokens {
    token: Option<SecretString>,
    refresh_token: Option<SecretString>,
    nickname: Option<String>,
}

/// The signed-in cloud account. Shared by every cloud request; a refresh
/// replaces the token for all of them.
#[derive(Default)]
pub struct CloudSession {
    inner: RwLock<SessionTokens>,
}

impl CloudSession {
    pub fn new(user: &UserInfo) -> Self {
        Self {
            inner: RwLock::new(SessionTokens {
                token: user.token.clone().map(SecretString::from),
                refresh_token: user.refresh_token.clone().map(SecretString::from),
                nickname: user.nickname.clone(),
            }),
        }
    }

    pub async fn token(&self) -> Option<String> {
        let tokens = self.inner.read().await;
        tokens.token.as_ref().map(|t| t.expose_secret().to_string())
    }

    pub async fn refresh_token(&self) -> Option<String> {
        let tokens = self.inner.read().await;
        tokens
            .refresh_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
    }

    pub async fn is_signed_in(&self) -> bool {
        let tokens = self.inner.read().await;
        tokens.token.is_some() && tokens.refresh_token.is_some()
    }

    pub async fn set_token(&self, token: String) {
        let mut tokens = self.inner.write().await;
        tokens.token = Some(SecretString::from(token));
        info!("Cloud session token replaced");
    }

    pub async fn set_nickname(&self, nickname: String) {
        let mut tokens = self.inner.write().await;
        tokens.nickname = Some(nickname);
    }

    /// Replace the whole session, e.g. after a sign-in handed over new tokens
    pub async fn replace(&self, user: &UserInfo) {
        let mut tokens = self.inner.write().await;
        *tokens = SessionTokens {
            token: user.token.clone().map(SecretString::from),
            refresh_token: user.refresh_token.clone().map(SecretString::from),
            nickname: user.nickname.clone(),
        };
    }

    /// Drop the tokens, keeping nothing to sign in with
    pub async fn clear(&self) {
        let mut tokens = self.inner.write().await;
        *tokens = SessionTokens::default();
    }

    /// Session as persisted inside the platform info blob
    pub async fn to_user_info(&self) -> UserInfo {
        let tokens = self.inner.read().await;
        UserInfo {
            token: tokens.token.as_ref().map(|t| t.expose_secret().to_string()),
            refresh_token: tokens
                .refresh_token
                .as_ref()
                .map(|t| t.expose_secret().to_string()),
            nickname: tokens.nickname.clone(),
        }
    }
}
