use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

/// Error kinds surfaced by the account lifecycle and its gateway.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("reset code does not match")]
    CodeMismatch,
    #[error("no pending password reset")]
    NoPendingReset,
    #[error("invalid date, expected dd-mm-yyyy")]
    InvalidDate,
    #[error("no fields provided")]
    NoFieldsProvided,
    #[error("invalid token")]
    InvalidToken,
    #[error("{0}")]
    Validation(String),
    #[error("stored password digest is corrupt")]
    CorruptDigest,
    #[error("failed to deliver email")]
    EmailDelivery(#[source] anyhow::Error),
    #[error("cache failure")]
    Cache(#[source] anyhow::Error),
    #[error("token signing failed")]
    Signing(#[source] anyhow::Error),
    #[error("password hashing failed")]
    Hashing(#[source] anyhow::Error),
    #[error("store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("object storage failure")]
    ObjectStorage(#[source] anyhow::Error),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::CodeMismatch => "CODE_MISMATCH",
            Self::NoPendingReset => "NO_PENDING_RESET",
            Self::InvalidDate => "INVALID_DATE",
            Self::NoFieldsProvided => "NO_FIELDS_PROVIDED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Validation(_) => "VALIDATION",
            Self::CorruptDigest => "CORRUPT_DIGEST",
            Self::EmailDelivery(_) => "EMAIL_DELIVERY_FAILURE",
            Self::Cache(_) => "CACHE_FAILURE",
            Self::Signing(_) => "SIGNING_FAILURE",
            Self::Hashing(_) => "HASHING_FAILURE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::ObjectStorage(_) => "OBJECT_STORAGE_FAILURE",
        }
    }

    /// True for failures of a collaborator rather than a rejected request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::CorruptDigest
                | Self::EmailDelivery(_)
                | Self::Cache(_)
                | Self::Signing(_)
                | Self::Hashing(_)
                | Self::StoreUnavailable(_)
                | Self::ObjectStorage(_)
        )
    }

    pub fn store(e: impl Into<anyhow::Error>) -> Self {
        Self::StoreUnavailable(e.into())
    }

    pub fn cache(e: impl Into<anyhow::Error>) -> Self {
        Self::Cache(e.into())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::NotFound | Self::NoPendingReset => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::CodeMismatch | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidDate | Self::NoFieldsProvided | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are already visible in the TraceLayer span; only internal failures carry a chain.
        if self.is_internal() {
            error!(error = ?self, kind = self.kind(), "internal error");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
