use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

/// Postgres error code for a row-level-security rejection.
pub const PERMISSION_DENIED_CODE: &str = "42501";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Store rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("No matching row: {0}")]
    RowNotFound(String),
}

impl StoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, StoreError::Unauthorized(_))
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::PermissionDenied(_) => Some(PERMISSION_DENIED_CODE),
            StoreError::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Read access to the `questions` table, the only thing question selection needs.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch_questions(
        &self,
        auth: &AuthSession,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, StoreError>;
}

/// Every table operation the quiz flows perform. Calls carry the caller's
/// session so the backend can apply row-level security.
#[async_trait]
pub trait QuizStore: QuestionSource {
    async fn insert_activity(
        &self,
        auth: &AuthSession,
        record: &NewActivityRecord,
    ) -> Result<(), StoreError>;

    /// The caller's activity rows, newest first.
    async fn recent_activity(
        &self,
        auth: &AuthSession,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError>;

    async fn insert_memory_prompt(
        &self,
        auth: &AuthSession,
        prompt: &NewMemoryPrompt,
    ) -> Result<MemoryPrompt, StoreError>;

    async fn update_memory_recall(
        &self,
        auth: &AuthSession,
        prompt_id: i64,
        update: &RecallUpdate,
    ) -> Result<(), StoreError>;

    /// The caller's most recently created prompt, optionally created at or after `since`.
    async fn latest_memory_prompt(
        &self,
        auth: &AuthSession,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<MemoryPrompt>, StoreError>;

    async fn display_name(&self, auth: &AuthSession) -> Result<Option<String>, StoreError>;
}
