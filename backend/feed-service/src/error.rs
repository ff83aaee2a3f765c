/// Error types for the feed service
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("outbox error: {0}")]
    Outbox(#[from] transactional_outbox::OutboxError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::NotFound(_) => 404,
            AppError::Config(_)
            | AppError::Database(_)
            | AppError::Outbox(_)
            | AppError::Internal(_) => 500,
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = actix_web::http::StatusCode::from_u16(self.status_code())
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);

        // Internal details stay in the logs, not in client responses.
        let message = match self {
            AppError::Database(_) | AppError::Outbox(_) | AppError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(serde_json::json!({ "error": message }))
    }
}

// NOTE: No need to implement From<AppError> for actix_web::Error
// because actix-web provides a blanket impl for all ResponseError types.
