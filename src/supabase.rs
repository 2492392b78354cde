use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Instant;

use crate::log_store_request;
use crate::models::*;
use crate::store::{PERMISSION_DENIED_CODE, QuestionSource, QuizStore, StoreError};

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    #[serde(default)]
    first_name: Option<String>,
}

/// Client for the managed backend's REST interface (`/rest/v1`).
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder, auth: &AuthSession) -> RequestBuilder {
        builder
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", auth.access_token))
    }

    async fn send(
        &self,
        operation: &'static str,
        table: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, StoreError> {
        log_store_request!(start, operation, table = table);
        let start = Instant::now();

        let response = request.send().await.map_err(|e| {
            log_store_request!(error, operation, table = table, status = "transport", error = e);
            StoreError::Transport(e)
        })?;

        let status = response.status();
        if status.is_success() {
            log_store_request!(
                success,
                operation,
                table = table,
                duration_ms = start.elapsed().as_millis() as u64
            );
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_response_error(status, &body);
        log_store_request!(error, operation, table = table, status = status, error = error);
        Err(error)
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        table: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<T>, StoreError> {
        let response = self.send(operation, table, request).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| StoreError::Decode(format!("{} rows: {}", table, e)))
    }
}

/// Map a failed PostgREST/GoTrue response onto the store error taxonomy.
pub fn classify_response_error(status: StatusCode, body: &str) -> StoreError {
    let parsed: PostgrestError = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        });
    let message = match (&parsed.details, &parsed.hint) {
        (Some(details), _) if !details.is_empty() => format!("{} ({})", message, details),
        (_, Some(hint)) if !hint.is_empty() => format!("{} (hint: {})", message, hint),
        _ => message,
    };

    match parsed.code.as_deref() {
        Some(PERMISSION_DENIED_CODE) => StoreError::PermissionDenied(message),
        // Expired or invalid JWT
        Some("PGRST301") | Some("PGRST302") => StoreError::Unauthorized(message),
        Some(code) => StoreError::Rejected {
            code: code.to_string(),
            message,
        },
        None if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            StoreError::Unauthorized(message)
        }
        None => StoreError::Rejected {
            code: status.as_u16().to_string(),
            message,
        },
    }
}

/// `in.(...)` operand with every value double-quoted so commas and
/// parentheses inside category names survive.
pub fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|value| format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn timestamp_param(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl QuestionSource for SupabaseStore {
    async fn fetch_questions(
        &self,
        auth: &AuthSession,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, StoreError> {
        let request = self
            .authorized(self.client.get(self.table_url("questions")), auth)
            .query(&[
                ("select", "*".to_string()),
                ("kategorie", in_list(&filter.categories)),
                ("schwierigkeitsgrad", format!("eq.{}", filter.difficulty)),
                ("limit", filter.limit.to_string()),
            ]);

        self.fetch_rows("fetch_questions", "questions", request).await
    }
}

#[async_trait]
impl QuizStore for SupabaseStore {
    async fn insert_activity(
        &self,
        auth: &AuthSession,
        record: &NewActivityRecord,
    ) -> Result<(), StoreError> {
        let request = self
            .authorized(self.client.post(self.table_url("user_activity")), auth)
            .header("Prefer", "return=minimal")
            .json(&[record]);

        self.send("insert_activity", "user_activity", request).await?;
        Ok(())
    }

    async fn recent_activity(
        &self,
        auth: &AuthSession,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", auth.user_id())),
            ("order", "timestamp.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(since) = since {
            params.push(("timestamp", format!("gte.{}", timestamp_param(&since))));
        }

        let request = self
            .authorized(self.client.get(self.table_url("user_activity")), auth)
            .query(&params);

        self.fetch_rows("recent_activity", "user_activity", request).await
    }

    async fn insert_memory_prompt(
        &self,
        auth: &AuthSession,
        prompt: &NewMemoryPrompt,
    ) -> Result<MemoryPrompt, StoreError> {
        let request = self
            .authorized(self.client.post(self.table_url("memory_prompts")), auth)
            .header("Prefer", "return=representation")
            .json(&[prompt]);

        let rows: Vec<MemoryPrompt> = self
            .fetch_rows("insert_memory_prompt", "memory_prompts", request)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no memory prompt row".to_string()))
    }

    async fn update_memory_recall(
        &self,
        auth: &AuthSession,
        prompt_id: i64,
        update: &RecallUpdate,
    ) -> Result<(), StoreError> {
        let request = self
            .authorized(self.client.patch(self.table_url("memory_prompts")), auth)
            .query(&[("id", format!("eq.{}", prompt_id))])
            .header("Prefer", "return=representation")
            .json(update);

        // Row-level security hides other users' rows, so a foreign id updates nothing
        let rows: Vec<MemoryPrompt> = self
            .fetch_rows("update_memory_recall", "memory_prompts", request)
            .await?;
        if rows.is_empty() {
            return Err(StoreError::RowNotFound(format!("memory prompt {}", prompt_id)));
        }
        Ok(())
    }

    async fn latest_memory_prompt(
        &self,
        auth: &AuthSession,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<MemoryPrompt>, StoreError> {
        let mut params = vec![
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", auth.user_id())),
            ("order", "created_at.desc".to_string()),
            ("limit", "1".to_string()),
        ];
        if let Some(since) = since {
            params.push(("created_at", format!("gte.{}", timestamp_param(&since))));
        }

        let request = self
            .authorized(self.client.get(self.table_url("memory_prompts")), auth)
            .query(&params);

        let rows: Vec<MemoryPrompt> = self
            .fetch_rows("latest_memory_prompt", "memory_prompts", request)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn display_name(&self, auth: &AuthSession) -> Result<Option<String>, StoreError> {
        let request = self
            .authorized(self.client.get(self.table_url("profiles")), auth)
            .query(&[
                ("select", "first_name".to_string()),
                ("user_id", format!("eq.{}", auth.user_id())),
                ("limit", "1".to_string()),
            ]);

        let rows: Vec<ProfileRow> = self.fetch_rows("display_name", "profiles", request).await?;
        Ok(rows.into_iter().next().and_then(|row| row.first_name))
    }
}
