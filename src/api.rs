use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

use crate::{
    auth::AuthProvider,
    catalog::{CategoryInfo, MoodInfo, CATEGORIES, MOODS},
    errors::{ApiError, ErrorContext},
    models::*,
    quiz_service::{QuizService, ServiceError},
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub quiz_service: QuizService,
    pub auth: Arc<dyn AuthProvider>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct MoodRequest {
    pub mood: String,
}

#[derive(Deserialize)]
pub struct CategoriesRequest {
    pub category_ids: Vec<String>,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Deserialize)]
pub struct MemoryPromptRequest {
    pub prompt_text: String,
}

#[derive(Deserialize)]
pub struct RecallRequest {
    pub recalled_text: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: AuthUser,
    pub display_name: Option<String>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;

fn service_error(error: ServiceError, context: ErrorContext) -> ErrorResponse {
    ApiError::from(error).to_response_with_context(context)
}

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// The session behind the request's bearer token.
pub struct CurrentUser(pub AuthSession);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = || ErrorContext::new("authenticate", "session");

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let Some(token) = token else {
            return Err(ApiError::Unauthorized("missing bearer token".to_string())
                .to_response_with_context(context()));
        };

        match state.auth.get_session(&token).await {
            Ok(Some(session)) => Ok(CurrentUser(session)),
            Ok(None) => Err(ApiError::Unauthorized("session expired or invalid".to_string())
                .to_response_with_context(context())),
            Err(e) => Err(ApiError::from(e).to_response_with_context(context())),
        }
    }
}

// Auth endpoints
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<AuthSession> {
    log_api_start!("login");

    if !EMAIL_PATTERN.is_match(request.email.trim()) || request.password.is_empty() {
        return Err(ApiError::ValidationError("Email and password are required".to_string())
            .to_response_with_context(ErrorContext::new("login", "session")));
    }

    match state
        .auth
        .sign_in_with_password(request.email.trim(), &request.password)
        .await
    {
        Ok(session) => {
            state.quiz_service.forget_display_name(session.user_id()).await;
            log_api_success!("login", user_id = session.user_id(), "signed in");
            Ok(Json(ApiResponse::success(session)))
        }
        Err(e) => {
            log_api_warn!("login", "sign-in failed");
            Err(ApiError::from(e).to_response_with_context(
                ErrorContext::new("login", "session")
                    .with_user_message("Invalid email or password."),
            ))
        }
    }
}

pub async fn me(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> ApiResult<MeResponse> {
    log_api_start!("me", user_id = auth.user_id());

    // A missing display name never blocks the caller.
    let display_name = match state.quiz_service.display_name(&auth).await {
        Ok(name) => name,
        Err(e) => {
            log_api_error!("me", user_id = auth.user_id(), error = e, "display name lookup failed");
            None
        }
    };

    Ok(Json(ApiResponse::success(MeResponse {
        user: auth.user,
        display_name,
    })))
}

// Catalog endpoints
pub async fn list_moods() -> Json<ApiResponse<&'static [MoodInfo]>> {
    Json(ApiResponse::success(MOODS))
}

pub async fn list_categories() -> Json<ApiResponse<&'static [CategoryInfo]>> {
    Json(ApiResponse::success(CATEGORIES))
}

// Selection endpoints
pub async fn get_selection(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> ApiResult<Selection> {
    Ok(Json(ApiResponse::success(
        state.quiz_service.selection(auth.user_id()).await,
    )))
}

pub async fn choose_mood(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Json(request): Json<MoodRequest>,
) -> ApiResult<Selection> {
    log_api_start!("choose_mood", user_id = auth.user_id());

    state
        .quiz_service
        .choose_mood(auth.user_id(), &request.mood)
        .await
        .map_err(|e| service_error(e, ErrorContext::new("choose_mood", "mood").with_id(&request.mood)))?;

    Ok(Json(ApiResponse::success(
        state.quiz_service.selection(auth.user_id()).await,
    )))
}

pub async fn choose_categories(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Json(request): Json<CategoriesRequest>,
) -> ApiResult<Selection> {
    log_api_start!("choose_categories", user_id = auth.user_id());

    match state
        .quiz_service
        .choose_categories(auth.user_id(), request.category_ids)
        .await
    {
        Ok(selection) => Ok(Json(ApiResponse::success(selection))),
        Err(e) => Err(service_error(e, ErrorContext::new("choose_categories", "category"))),
    }
}

// Quiz endpoints
pub async fn start_quiz(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> ApiResult<QuizSessionView> {
    log_api_start!("start_quiz", user_id = auth.user_id());

    match state.quiz_service.start_quiz(&auth).await {
        Ok(session) => {
            log_api_success!(
                "start_quiz",
                session_id = session.session_id,
                format!("{} questions", session.questions.len())
            );
            Ok(Json(ApiResponse::success(session.view())))
        }
        Err(e) => {
            let mut context = ErrorContext::new("start_quiz", "question");
            if e.is_store_failure() {
                context = context.with_user_message("Failed to load questions. Please try again.");
            }
            Err(service_error(e, context))
        }
    }
}

pub async fn get_quiz(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(session_id): Path<Uuid>,
) -> ApiResult<QuizSessionView> {
    log_api_start!("get_quiz", session_id = session_id);

    match state.quiz_service.quiz_session(auth.user_id(), session_id).await {
        Ok(session) => Ok(Json(ApiResponse::success(session.view()))),
        Err(e) => Err(service_error(
            e,
            ErrorContext::new("get_quiz", "quiz_session").with_id(&session_id.to_string()),
        )),
    }
}

pub async fn answer_question(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(session_id): Path<Uuid>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<AnswerOutcome> {
    log_api_start!("answer_question", session_id = session_id);

    match state
        .quiz_service
        .answer_question(&auth, session_id, &request.answer)
        .await
    {
        Ok(outcome) => {
            log_api_success!(
                "answer_question",
                session_id = session_id,
                if outcome.correct { "correct answer" } else { "wrong answer" }
            );
            Ok(Json(ApiResponse::success(outcome)))
        }
        Err(e) => {
            let mut context = ErrorContext::new("answer_question", "quiz_session")
                .with_id(&session_id.to_string());
            if e.is_store_failure() {
                context = context
                    .with_user_message("Failed to save the answer. It may be missing from the report.");
            }
            Err(service_error(e, context))
        }
    }
}

// Memory prompt endpoints
pub async fn save_memory_prompt(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Json(request): Json<MemoryPromptRequest>,
) -> ApiResult<MemoryPrompt> {
    log_api_start!("save_memory_prompt", user_id = auth.user_id());

    match state
        .quiz_service
        .save_memory_prompt(&auth, &request.prompt_text)
        .await
    {
        Ok(prompt) => Ok(Json(ApiResponse::success(prompt))),
        Err(e) => Err(service_error(e, ErrorContext::new("save_memory_prompt", "memory_prompt"))),
    }
}

pub async fn latest_memory_prompt(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> ApiResult<Option<MemoryPrompt>> {
    match state.quiz_service.latest_memory_prompt(&auth).await {
        Ok(prompt) => Ok(Json(ApiResponse::success(prompt))),
        Err(e) => Err(service_error(
            e,
            ErrorContext::new("latest_memory_prompt", "memory_prompt"),
        )),
    }
}

pub async fn evening_recall(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Json(request): Json<RecallRequest>,
) -> ApiResult<RecallOutcome> {
    log_api_start!("evening_recall", user_id = auth.user_id());

    match state
        .quiz_service
        .evening_recall(&auth, &request.recalled_text)
        .await
    {
        Ok(outcome) => {
            log_api_success!(
                "evening_recall",
                user_id = auth.user_id(),
                if outcome.correct { "recalled correctly" } else { "recall missed" }
            );
            Ok(Json(ApiResponse::success(outcome)))
        }
        Err(e) => {
            let mut context = ErrorContext::new("evening_recall", "memory_prompt");
            if matches!(e, ServiceError::NoMemoryPrompt) {
                context = context.with_user_message("No memory prompt found. Create one this morning first.");
            }
            Err(service_error(e, context))
        }
    }
}

// Report endpoint
pub async fn daily_report(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> ApiResult<DailyReport> {
    match state.quiz_service.daily_report(&auth).await {
        Ok(report) => {
            log_api_success!("daily_report", count = report.activity.len(), "report built");
            Ok(Json(ApiResponse::success(report)))
        }
        Err(e) => Err(service_error(e, ErrorContext::new("daily_report", "report"))),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Auth routes
        .route("/api/auth/login", post(login))
        .route("/api/me", get(me))

        // Catalog routes
        .route("/api/moods", get(list_moods))
        .route("/api/categories", get(list_categories))

        // Selection routes
        .route("/api/selection", get(get_selection))
        .route("/api/selection/mood", put(choose_mood))
        .route("/api/selection/categories", put(choose_categories))

        // Quiz routes
        .route("/api/quiz/start", post(start_quiz))
        .route("/api/quiz/:id", get(get_quiz))
        .route("/api/quiz/:id/answer", post(answer_question))

        // Memory prompt routes
        .route("/api/memory-prompts", post(save_memory_prompt))
        .route("/api/memory-prompts/latest", get(latest_memory_prompt))
        .route("/api/memory-prompts/recall", post(evening_recall))

        // Report routes
        .route("/api/report", get(daily_report))

        .with_state(state)
}
