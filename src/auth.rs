use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{AuthSession, AuthUser};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid login credentials: {0}")]
    InvalidCredentials(String),

    #[error("Auth provider rejected request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("Auth provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed auth response: {0}")]
    Malformed(String),
}

/// The external authentication collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    /// The user owning `access_token`, or `None` if the token is not valid.
    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, AuthError>;

    async fn get_session(&self, access_token: &str) -> Result<Option<AuthSession>, AuthError> {
        Ok(self.get_user(access_token).await?.map(|user| AuthSession {
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_in: None,
            user,
        }))
    }
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

/// GoTrue client for the managed backend's `/auth/v1` endpoints.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }
}

/// GoTrue has used both `error_description` and `msg` for the human-readable text.
fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| json.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| status.to_string())
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        debug!(email = %email, "Signing in with password");

        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let message = error_message(&body, status);
            warn!(email = %email, error = %message, "Sign-in rejected");
            return Err(AuthError::InvalidCredentials(message));
        }
        if !status.is_success() {
            return Err(AuthError::Provider {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        serde_json::from_str::<AuthSession>(&body).map_err(|e| AuthError::Malformed(e.to_string()))
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(status = %status, "Access token rejected");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::Provider {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        serde_json::from_str::<AuthUser>(&body)
            .map(Some)
            .map_err(|e| AuthError::Malformed(e.to_string()))
    }
}
