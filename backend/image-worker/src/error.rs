/// HTTP-facing errors
///
/// Every error renders as `{"error": {"code", "message", "details"}}`.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use thiserror::Error;

pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BROKER_ERROR: &str = "BROKER_ERROR";
    pub const BROKER_TIMEOUT: &str = "BROKER_TIMEOUT";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Body could not be parsed
    #[error("Bad request")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(String),

    #[error("Failed to send message")]
    Broker(String),

    #[error("Timed out sending message")]
    BrokerTimeout,

    #[error("Producer not configured")]
    Unavailable,

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => codes::BAD_REQUEST,
            ApiError::Validation(_) => codes::VALIDATION_ERROR,
            ApiError::Broker(_) => codes::BROKER_ERROR,
            ApiError::BrokerTimeout => codes::BROKER_TIMEOUT,
            ApiError::Unavailable => codes::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ApiError::BadRequest(d)
            | ApiError::Validation(d)
            | ApiError::Broker(d)
            | ApiError::Internal(d) => Some(d.clone()),
            ApiError::BrokerTimeout | ApiError::Unavailable => None,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Broker(_) => StatusCode::BAD_GATEWAY,
            ApiError::BrokerTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            },
        })
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation(errors.to_string())
    }
}
