use crate::api::ApiResponse;
use crate::auth::AuthError;
use crate::question_selector::SelectionError;
use crate::quiz_service::ServiceError;
use crate::store::StoreError;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Auth provider error: {0}")]
    AuthProviderError(String),
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub user_friendly_message: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
            user_friendly_message: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_user_message(mut self, message: &str) -> Self {
        self.user_friendly_message = Some(message.to_string());
        self
    }
}

impl ApiError {
    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| format!("{} not found", context.resource_type)),
                    )),
                )
            }
            ApiError::ValidationError(message) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
                (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(message.clone())),
                )
            }
            ApiError::Unauthorized(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Unauthenticated request"
                );
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| "Please sign in again.".to_string()),
                    )),
                )
            }
            ApiError::PermissionDenied(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Permission denied by row-level security"
                );
                (
                    StatusCode::FORBIDDEN,
                    Json(ApiResponse::error(
                        "Not permitted to save this record. Please contact the administrator."
                            .to_string(),
                    )),
                )
            }
            ApiError::StoreError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Store error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiResponse::error(
                        context
                            .user_friendly_message
                            .unwrap_or_else(|| "Store operation failed. Please try again.".to_string()),
                    )),
                )
            }
            ApiError::AuthProviderError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    error = %self,
                    "Auth provider error"
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse::error(
                        "Sign-in service temporarily unavailable. Please try again.".to_string(),
                    )),
                )
            }
        }
    }

    /// Simple conversion without context
    pub fn to_response(self) -> (StatusCode, Json<ApiResponse<()>>) {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unauthorized(message) => ApiError::Unauthorized(message),
            StoreError::PermissionDenied(message) => ApiError::PermissionDenied(message),
            StoreError::RowNotFound(message) => ApiError::NotFound(message),
            other => ApiError::StoreError(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(message) => ApiError::Unauthorized(message),
            other => ApiError::AuthProviderError(other.to_string()),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Selection(SelectionError::NoCategories) => {
                ApiError::ValidationError(SelectionError::NoCategories.to_string())
            }
            ServiceError::Selection(SelectionError::Lookup { source, .. }) => source.into(),
            ServiceError::Store(source) => source.into(),
            ServiceError::SessionNotFound(id) => {
                ApiError::NotFound(format!("Quiz session '{}' not found", id))
            }
            ServiceError::SessionFinished(id) => {
                ApiError::ValidationError(format!("Quiz session '{}' is already finished", id))
            }
            ServiceError::NoMemoryPrompt => ApiError::NotFound("No memory prompt found".to_string()),
            ServiceError::Validation(message) => ApiError::ValidationError(message),
        }
    }
}
