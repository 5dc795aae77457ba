use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    /// Input rejected with a stable machine-readable code.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// A coded rejection with its own status (duplicate email, bad credentials, ...).
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn rejected(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        AppError::Rejected {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation { code, .. } | AppError::Rejected { code, .. } => *code,
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_) | AppError::Http(_) => "DATABASE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Json(_) => "INVALID_JSON",
            AppError::Toml(_) | AppError::Io(_) | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation { .. } | AppError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Rejected { status, .. } => *status,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Toml(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand back to a client. Upstream failures are logged, not echoed.
    pub fn message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Http(_) => "database request failed".to_string(),
            AppError::Config(_) | AppError::Toml(_) | AppError::Io(_) | AppError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
    }
}

/// Plain rendering: `{"detail": "..."}`.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = json!({ "detail": self.message() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Envelope rendering: `{"success": false, "data": null, "error": {code, message}}`.
#[derive(Debug)]
pub struct EnvelopeError(pub AppError);

impl From<AppError> for EnvelopeError {
    fn from(err: AppError) -> Self {
        EnvelopeError(err)
    }
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        let err = self.0;
        err.log();
        let body = json!({
            "success": false,
            "data": null,
            "error": { "code": err.code(), "message": err.message() },
        });
        (err.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(AppError::not_found("Space").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("dup".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::validation("MEMO_TOO_LONG", "too long").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Database("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn validation_code_is_kept() {
        let err = AppError::validation("REASON_REQUIRED", "reason is required");
        assert_eq!(err.code(), "REASON_REQUIRED");
        assert_eq!(err.message(), "reason is required");
    }

    #[test]
    fn rejection_carries_status_and_code() {
        let err = AppError::rejected(StatusCode::CONFLICT, "EMAIL_ALREADY_EXISTS", "taken");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "EMAIL_ALREADY_EXISTS");
    }

    #[test]
    fn upstream_details_are_hidden() {
        let err = AppError::Database("relation \"x\" does not exist".into());
        assert_eq!(err.message(), "database request failed");
    }
}
