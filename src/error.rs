use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error surfaced by services and handlers.
///
/// Out-of-scope reads are reported as `NotFound` so a caller cannot probe
/// for rows belonging to another clinic.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    ProfileNotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Integrity(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::ProfileNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Integrity(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::ProfileNotFound(_) => "profile_not_found",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Integrity(_) => "integrity_error",
            AppError::TooManyRequests(_) => "rate_limited",
            AppError::Internal(_) => "internal",
        }
    }
}

/// The constraint message when `err` is a unique or foreign-key violation.
pub(crate) fn integrity_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // unique_violation, foreign_key_violation
            Some("23505") | Some("23503") => Some(db.message().to_string()),
            _ => None,
        },
        _ => None,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return AppError::NotFound("Not found".into());
        }
        match integrity_violation(&err) {
            Some(msg) => AppError::Integrity(msg),
            None => AppError::Internal(err.into()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message, "code": self.code() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_follow_variant() {
        let cases = [
            (AppError::validation("bad"), StatusCode::BAD_REQUEST, "validation_error"),
            (AppError::not_found("gone"), StatusCode::NOT_FOUND, "not_found"),
            (AppError::forbidden("no"), StatusCode::FORBIDDEN, "forbidden"),
            (
                AppError::ProfileNotFound("Therapist profile not found".into()),
                StatusCode::NOT_FOUND,
                "profile_not_found",
            ),
            (AppError::Integrity("dup".into()), StatusCode::CONFLICT, "integrity_error"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn internal_error_hides_details() {
        let resp = AppError::Internal(anyhow::anyhow!("db password leaked")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
