use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts, Query, Request,
        rejection::JsonRejection,
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// AppError
///
/// The single failure type returned by managers and handlers. Each variant maps to exactly one
/// HTTP status in `IntoResponse`, so handlers never pick status codes for failures themselves.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input (400).
    #[error("{0}")]
    Validation(String),

    /// Bad credentials, missing or expired token (401).
    #[error("{0}")]
    Unauthorized(String),

    /// A token that is present but structurally unusable (422).
    #[error("{0}")]
    InvalidToken(String),

    /// Authenticated, but the role or ownership does not allow the operation (403).
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Uniqueness violations and blocked deletes (409).
    #[error("{0}")]
    Conflict(String),

    /// An external collaborator (object store, mail relay) failed (502).
    #[error("{0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        // Constraint violations are client-visible conflicts, everything else is a 500.
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict("Resource already exists".to_string());
            }
            if db_err.is_foreign_key_violation() {
                return AppError::Conflict("Resource is still referenced by other records".to_string());
            }
        }
        AppError::Database(err)
    }
}

/// ErrorBody
///
/// The JSON envelope used for every failed response: `{"error": "..."}`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidToken(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Database(_) | AppError::Internal(_) => {
                // Logged here once; the client only ever sees the generic message.
                tracing::error!(error = %self, "request failed with an internal error");
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// ApiJson
///
/// Drop-in replacement for `axum::Json` whose rejection is an `AppError::Validation`, so a
/// malformed body still produces the standard JSON error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

/// ApiQuery
///
/// Same as `ApiJson`, for query strings.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}
