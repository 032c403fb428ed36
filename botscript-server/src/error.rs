//! Error types for the HTTP server

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use botscript_sandbox::{SandboxError, ScriptResponse, ERROR_MARKER};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal failures never leak details to the caller
        let body = match self {
            Self::BadRequest(_) => ScriptResponse::error(self.to_string()),
            _ => ScriptResponse::error(ERROR_MARKER),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
