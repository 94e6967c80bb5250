use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::llm_client::LlmError;

/// Failures of the enrichment pipeline.
///
/// `InvalidInput`, `UpstreamUnavailable` and `IneligibleRecord` come from the
/// identity stage and abort an enrichment. `NotFound` is only produced by an
/// explicit facility refresh; during a full enrichment a missing facility is
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    /// The CNPJ does not have 14 digits after cleaning. No request was made.
    InvalidInput(String),
    /// BrasilAPI could not be reached or answered with a non-2xx status.
    UpstreamUnavailable {
        /// HTTP status, when the registry answered at all.
        status: Option<u16>,
        message: String,
    },
    /// The registry record exists but its registration status is not active.
    IneligibleRecord { situacao: String },
    /// No CNES establishment was located for an explicit refresh.
    NotFound(String),
}

impl EnrichmentError {
    /// Stable machine-readable code, serialized next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            EnrichmentError::InvalidInput(_) => "invalid_input",
            EnrichmentError::UpstreamUnavailable { .. } => "upstream_unavailable",
            EnrichmentError::IneligibleRecord { .. } => "ineligible_record",
            EnrichmentError::NotFound(_) => "not_found",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            EnrichmentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EnrichmentError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            EnrichmentError::IneligibleRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EnrichmentError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl fmt::Display for EnrichmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentError::InvalidInput(cnpj) => {
                write!(f, "CNPJ inválido: {}. Deve conter 14 dígitos.", cnpj)
            }
            EnrichmentError::UpstreamUnavailable { message, .. } => write!(f, "{}", message),
            EnrichmentError::IneligibleRecord { situacao } => write!(
                f,
                "CNPJ com situação cadastral \"{}\". Apenas CNPJs ativos são aceitos.",
                situacao
            ),
            EnrichmentError::NotFound(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EnrichmentError {}

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Request is well formed but cannot be processed (e.g. inactive CNPJ).
    UnprocessableEntity(String),
    /// An upstream data source failed; the message is shown to the caller.
    BadGateway(String),
    /// A feature is disabled by configuration.
    ServiceUnavailable(String),
    /// Internal server error.
    InternalError(String),
    /// Unauthorized access error.
    Unauthorized(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::UnprocessableEntity(msg) => write!(f, "Unprocessable entity: {}", msg),
            AppError::BadGateway(msg) => write!(f, "Upstream error: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each variant to an HTTP status code and a JSON `{"error": ...}` body.
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.into_response();
            }
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::BadGateway(msg) => {
                tracing::warn!("Upstream error surfaced to caller: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        AppError::BadGateway(err.to_string())
    }
}

impl From<EnrichmentError> for AppError {
    fn from(err: EnrichmentError) -> Self {
        let message = err.to_string();
        match err {
            EnrichmentError::InvalidInput(_) => AppError::BadRequest(message),
            EnrichmentError::UpstreamUnavailable { .. } => AppError::BadGateway(message),
            EnrichmentError::IneligibleRecord { .. } => AppError::UnprocessableEntity(message),
            EnrichmentError::NotFound(_) => AppError::NotFound(message),
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_error_messages_are_human_readable() {
        let err = EnrichmentError::InvalidInput("123".to_string());
        assert_eq!(err.to_string(), "CNPJ inválido: 123. Deve conter 14 dígitos.");

        let err = EnrichmentError::IneligibleRecord {
            situacao: "BAIXADA".to_string(),
        };
        assert!(err.to_string().contains("\"BAIXADA\""));
    }

    #[test]
    fn test_enrichment_error_status_mapping() {
        assert_eq!(
            EnrichmentError::InvalidInput(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EnrichmentError::UpstreamUnavailable {
                status: Some(500),
                message: "down".to_string()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            EnrichmentError::NotFound(String::new()).code(),
            "not_found"
        );
    }

    #[test]
    fn test_enrichment_errors_map_to_app_errors() {
        let response = AppError::from(EnrichmentError::IneligibleRecord {
            situacao: "BAIXADA".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = AppError::from(EnrichmentError::UpstreamUnavailable {
            status: None,
            message: "timeout".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_sqlx_context_is_internal_error() {
        let err: Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let response = err.context("loading prospect").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_with_context_delegates_status() {
        let err: Result<(), AppError> = Err(AppError::NotFound("prospect".to_string()));
        let response = err.context("loading prospect").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
