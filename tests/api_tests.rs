use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use mood_quiz::api::*;
use chrono::{DateTime, Utc};
use mood_quiz::{
    ActivityRecord, AuthError, AuthProvider, AuthSession, AuthUser, Database, DisplayNameCache,
    MemoryPrompt, NewActivityRecord, NewMemoryPrompt, NewQuestion, Question, QuestionFilter,
    QuestionSource, QuizService, QuizStore, RecallUpdate, StoreError,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Accepts any `<name>@example.com` with password "secret" and issues `token-<name>`.
struct StubAuth;

#[async_trait]
impl AuthProvider for StubAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let Some(name) = email.strip_suffix("@example.com") else {
            return Err(AuthError::Provider {
                status: 500,
                message: "unexpected domain".to_string(),
            });
        };
        if password != "secret" {
            return Err(AuthError::InvalidCredentials(
                "Invalid login credentials".to_string(),
            ));
        }
        Ok(AuthSession {
            access_token: format!("token-{}", name),
            refresh_token: Some("refresh".to_string()),
            expires_in: Some(3600),
            user: AuthUser {
                id: name.to_string(),
                email: Some(email.to_string()),
            },
        })
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, AuthError> {
        Ok(access_token.strip_prefix("token-").map(|name| AuthUser {
            id: name.to_string(),
            email: Some(format!("{}@example.com", name)),
        }))
    }
}

async fn create_test_server() -> (TestServer, Arc<Database>) {
    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());

    let mut batch = Vec::new();
    for difficulty in 1..=3 {
        for n in 0..5 {
            batch.push(NewQuestion {
                category: "Mathe".to_string(),
                prompt: format!("{} + {}?", difficulty, n),
                answer_options: Some(vec![
                    (difficulty + n).to_string(),
                    (difficulty + n + 1).to_string(),
                ]),
                correct_answer: (difficulty + n).to_string(),
                difficulty,
                tag: None,
                explanation: Some("Addition".to_string()),
            });
        }
    }
    db.insert_questions(&batch).await.unwrap();

    let app_state = AppState {
        quiz_service: QuizService::new(db.clone(), DisplayNameCache::new(100, 30)),
        auth: Arc::new(StubAuth),
    };

    let app = create_router(app_state);
    (TestServer::new(app).unwrap(), db)
}

/// Store where every call fails with the same error.
struct FailingStore {
    error: fn() -> StoreError,
}

#[async_trait]
impl QuestionSource for FailingStore {
    async fn fetch_questions(
        &self,
        _auth: &AuthSession,
        _filter: &QuestionFilter,
    ) -> Result<Vec<Question>, StoreError> {
        Err((self.error)())
    }
}

#[async_trait]
impl QuizStore for FailingStore {
    async fn insert_activity(
        &self,
        _auth: &AuthSession,
        _record: &NewActivityRecord,
    ) -> Result<(), StoreError> {
        Err((self.error)())
    }

    async fn recent_activity(
        &self,
        _auth: &AuthSession,
        _since: Option<DateTime<Utc>>,
        _limit: usize,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        Err((self.error)())
    }

    async fn insert_memory_prompt(
        &self,
        _auth: &AuthSession,
        _prompt: &NewMemoryPrompt,
    ) -> Result<MemoryPrompt, StoreError> {
        Err((self.error)())
    }

    async fn update_memory_recall(
        &self,
        _auth: &AuthSession,
        _prompt_id: i64,
        _update: &RecallUpdate,
    ) -> Result<(), StoreError> {
        Err((self.error)())
    }

    async fn latest_memory_prompt(
        &self,
        _auth: &AuthSession,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Option<MemoryPrompt>, StoreError> {
        Err((self.error)())
    }

    async fn display_name(&self, _auth: &AuthSession) -> Result<Option<String>, StoreError> {
        Err((self.error)())
    }
}

fn create_failing_server(error: fn() -> StoreError) -> TestServer {
    let app_state = AppState {
        quiz_service: QuizService::new(Arc::new(FailingStore { error }), DisplayNameCache::new(100, 30)),
        auth: Arc::new(StubAuth),
    };
    TestServer::new(create_router(app_state)).unwrap()
}

fn statement_timeout() -> StoreError {
    StoreError::Rejected {
        code: "57014".to_string(),
        message: "canceling statement due to statement timeout".to_string(),
    }
}

fn expired_jwt() -> StoreError {
    StoreError::Unauthorized("JWT expired".to_string())
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

#[tokio::test]
async fn test_login_returns_session() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/auth/login")
        .json(&json!({ "email": "anna@example.com", "password": "secret" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["access_token"], "token-anna");
    assert_eq!(body["data"]["user"]["id"], "anna");
}

#[tokio::test]
async fn test_login_failures() {
    let (server, _db) = create_test_server().await;

    let wrong_password = server
        .post("/api/auth/login")
        .json(&json!({ "email": "anna@example.com", "password": "nope" }))
        .await;
    wrong_password.assert_status(StatusCode::UNAUTHORIZED);

    let malformed = server
        .post("/api/auth/login")
        .json(&json!({ "email": "not-an-email", "password": "secret" }))
        .await;
    malformed.assert_status(StatusCode::BAD_REQUEST);

    let provider_down = server
        .post("/api/auth/login")
        .json(&json!({ "email": "anna@elsewhere.org", "password": "secret" }))
        .await;
    provider_down.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (server, _db) = create_test_server().await;

    server.get("/api/selection").await.assert_status(StatusCode::UNAUTHORIZED);
    server.post("/api/quiz/start").await.assert_status(StatusCode::UNAUTHORIZED);

    let bad_token = server
        .get("/api/report")
        .add_header(AUTHORIZATION, bearer("expired"))
        .await;
    bad_token.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = bad_token.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_catalogs_are_public() {
    let (server, _db) = create_test_server().await;

    let moods: Value = server.get("/api/moods").await.json();
    let ids: Vec<&str> = moods["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|mood| mood["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["sad", "neutral", "happy"]);

    let categories: Value = server.get("/api/categories").await.json();
    let categories = categories["data"].as_array().unwrap();
    assert_eq!(categories.len(), 6);
    assert_eq!(categories[2]["id"], "geschichte");
    assert_eq!(categories[2]["name"], "Name Recall (Historische)");
}

#[tokio::test]
async fn test_selection_endpoints() {
    let (server, _db) = create_test_server().await;

    let mood = server
        .put("/api/selection/mood")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "mood": "sad" }))
        .await;
    mood.assert_status_ok();

    server
        .put("/api/selection/mood")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "mood": "ecstatic" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    server
        .put("/api/selection/categories")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "category_ids": [] }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let categories = server
        .put("/api/selection/categories")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "category_ids": ["mathe", "logik"] }))
        .await;
    categories.assert_status_ok();

    let selection: Value = server
        .get("/api/selection")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .await
        .json();
    assert_eq!(selection["data"]["mood"], "sad");
    assert_eq!(selection["data"]["category_ids"], json!(["mathe", "logik"]));
}

#[tokio::test]
async fn test_start_quiz_without_categories() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/quiz/start")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "No categories selected");
}

#[tokio::test]
async fn test_quiz_round_trip() {
    let (server, _db) = create_test_server().await;
    let token = bearer("token-ben");

    server
        .put("/api/selection/categories")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "category_ids": ["mathe"] }))
        .await
        .assert_status_ok();

    let started = server
        .post("/api/quiz/start")
        .add_header(AUTHORIZATION, token.clone())
        .await;
    started.assert_status_ok();
    let started: Value = started.json();
    let session_id = started["data"]["session_id"].as_str().unwrap().to_string();
    let questions = started["data"]["questions"].as_array().unwrap().clone();
    assert_eq!(questions.len(), 5);
    assert_eq!(started["data"]["mood"], "neutral");
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));

    // Options are [answer, answer + 1]; the first one is always right.
    for (index, question) in questions.iter().enumerate() {
        let answer = question["answer_options"][0].as_str().unwrap();
        let response = server
            .post(&format!("/api/quiz/{}/answer", session_id))
            .add_header(AUTHORIZATION, token.clone())
            .json(&json!({ "answer": answer }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["correct"], true);
        assert_eq!(body["data"]["current"], index + 1);
        assert_eq!(body["data"]["explanation"], "Addition");
    }

    let progress: Value = server
        .get(&format!("/api/quiz/{}", session_id))
        .add_header(AUTHORIZATION, token.clone())
        .await
        .json();
    assert_eq!(progress["data"]["finished"], true);
    assert_eq!(progress["data"]["score"], 5);

    server
        .post(&format!("/api/quiz/{}/answer", session_id))
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "answer": "1" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let report: Value = server
        .get("/api/report")
        .add_header(AUTHORIZATION, token)
        .await
        .json();
    assert_eq!(report["data"]["answered"], 5);
    assert_eq!(report["data"]["correct"], 5);
}

#[tokio::test]
async fn test_quiz_session_is_not_shared() {
    let (server, _db) = create_test_server().await;

    server
        .put("/api/selection/categories")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "category_ids": ["mathe"] }))
        .await
        .assert_status_ok();
    let started: Value = server
        .post("/api/quiz/start")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .await
        .json();
    let session_id = started["data"]["session_id"].as_str().unwrap().to_string();

    server
        .get(&format!("/api/quiz/{}", session_id))
        .add_header(AUTHORIZATION, bearer("token-ben"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_memory_prompt_endpoints() {
    let (server, _db) = create_test_server().await;
    let token = bearer("token-cleo");

    server
        .post("/api/memory-prompts/recall")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "recalled_text": "Blauer Himmel" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let latest: Value = server
        .get("/api/memory-prompts/latest")
        .add_header(AUTHORIZATION, token.clone())
        .await
        .json();
    assert!(latest["data"].is_null());

    server
        .post("/api/memory-prompts")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "prompt_text": "" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let saved = server
        .post("/api/memory-prompts")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "prompt_text": "Blauer Himmel" }))
        .await;
    saved.assert_status_ok();

    let recall = server
        .post("/api/memory-prompts/recall")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "recalled_text": "blauer himmel" }))
        .await;
    recall.assert_status_ok();
    let recall: Value = recall.json();
    assert_eq!(recall["data"]["correct"], true);

    let report: Value = server
        .get("/api/report")
        .add_header(AUTHORIZATION, token)
        .await
        .json();
    assert_eq!(report["data"]["recall_status"], "correct");
    assert_eq!(report["data"]["memory_prompt"]["prompt_text"], "Blauer Himmel");
}

#[tokio::test]
async fn test_me_includes_display_name() {
    let (server, db) = create_test_server().await;
    db.upsert_profile("dana", "Dana").await.unwrap();

    let me: Value = server
        .get("/api/me")
        .add_header(AUTHORIZATION, bearer("token-dana"))
        .await
        .json();
    assert_eq!(me["data"]["user"]["id"], "dana");
    assert_eq!(me["data"]["display_name"], "Dana");

    let nameless: Value = server
        .get("/api/me")
        .add_header(AUTHORIZATION, bearer("token-emil"))
        .await
        .json();
    assert!(nameless["data"]["display_name"].is_null());
}

#[tokio::test]
async fn test_recall_store_failure_is_not_reported_as_missing_prompt() {
    let server = create_failing_server(statement_timeout);

    let response = server
        .post("/api/memory-prompts/recall")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "recalled_text": "Blauer Himmel" }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "Store operation failed. Please try again.");
}

#[tokio::test]
async fn test_missing_prompt_message_only_for_missing_prompt() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/memory-prompts/recall")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "recalled_text": "Blauer Himmel" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "No memory prompt found. Create one this morning first.");
}

#[tokio::test]
async fn test_start_quiz_with_expired_store_token_asks_for_sign_in() {
    let server = create_failing_server(expired_jwt);
    let token = bearer("token-anna");

    server
        .put("/api/selection/categories")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "category_ids": ["mathe"] }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/quiz/start")
        .add_header(AUTHORIZATION, token)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "Please sign in again.");
}

#[tokio::test]
async fn test_start_quiz_store_failure_message() {
    let server = create_failing_server(statement_timeout);
    let token = bearer("token-anna");

    server
        .put("/api/selection/categories")
        .add_header(AUTHORIZATION, token.clone())
        .json(&json!({ "category_ids": ["mathe"] }))
        .await
        .assert_status_ok();

    let response = server
        .post("/api/quiz/start")
        .add_header(AUTHORIZATION, token)
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"], "Failed to load questions. Please try again.");
}

#[tokio::test]
async fn test_answer_for_unknown_session_is_plain_not_found() {
    let (server, _db) = create_test_server().await;

    let response = server
        .post("/api/quiz/00000000-0000-0000-0000-000000000000/answer")
        .add_header(AUTHORIZATION, bearer("token-anna"))
        .json(&json!({ "answer": "1" }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"], "quiz_session not found");
}
