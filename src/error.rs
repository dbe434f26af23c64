use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{policy::DenyReason, repository::RepositoryError, service::LoginError};

/// AuthError
///
/// The identity and authorization failure taxonomy. Every variant is terminal
/// for the current request: nothing is retried, and a denial always happens
/// before any write is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,
    #[error("credential must be of the form 'Bearer <token>'")]
    BadCredentialFormat,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("credential expired, please log in again")]
    CredentialExpired,
    #[error("user does not exist")]
    UserNotFound,
    #[error("wrong password")]
    PasswordWrong,
    #[error("no right to perform this action: {0}")]
    NoRight(DenyReason),
    #[error("target account not found")]
    TargetNotFound,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::BadCredentialFormat => "bad_credential_format",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::CredentialExpired => "credential_expired",
            AuthError::UserNotFound => "user_not_found",
            AuthError::PasswordWrong => "password_wrong",
            AuthError::NoRight(reason) => reason.code(),
            AuthError::TargetNotFound => "target_not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::NoRight(_) => StatusCode::FORBIDDEN,
            AuthError::TargetNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<DenyReason> for AuthError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::TargetNotFound => AuthError::TargetNotFound,
            other => AuthError::NoRight(other),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        error_body(self.status(), self.code(), self.to_string())
    }
}

/// ApiError
///
/// Handler-level error: the auth taxonomy plus the failures of the user
/// administration endpoints themselves.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("username is already taken")]
    UsernameTaken,
    #[error("{0}")]
    Validation(String),
    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(e) => e.status(),
            ApiError::UsernameTaken => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Auth(e) => e.code(),
            ApiError::UsernameTaken => "username_taken",
            ApiError::Validation(_) => "validation_failed",
            ApiError::Internal => "internal_error",
        }
    }
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        ApiError::Auth(reason.into())
    }
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Denied(e) => ApiError::Auth(e),
            LoginError::Token(e) => {
                tracing::error!("token issuance failed: {}", e);
                ApiError::Internal
            }
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict => ApiError::UsernameTaken,
            RepositoryError::Unavailable => ApiError::Internal,
        }
    }
}

// Extractor rejections get the same JSON body as every other error.

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Report the first offending field, like a form would.
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .next()
            .unwrap_or_else(|| "invalid payload".to_string());
        ApiError::Validation(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_body(self.status(), self.code(), self.to_string())
    }
}

fn error_body(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "status": status.as_u16(),
            "error": code,
            "message": message,
        })),
    )
        .into_response()
}
