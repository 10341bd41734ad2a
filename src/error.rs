use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::casbin;
use crate::jsonwebtoken::errors::Error as JsonWebTokenError;
use crate::sqlx;
use crate::thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("forbidden")]
    Forbidden,

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("revote is not permitted for this vote")]
    RevoteDisallowed,

    #[error("vote is not open")]
    ClosedVote,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("jwt error: {0}")]
    JWTError(#[from] JsonWebTokenError),

    #[error("privilege error: {0}")]
    PrivilegeError(#[from] casbin::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    ServerError(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ValidationError(_) => "validation_error",
            Error::Forbidden => "forbidden",
            Error::Unauthorized => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::RevoteDisallowed => "revote_disallowed",
            Error::ClosedVote => "closed_vote",
            Error::Conflict(_) => "conflict",
            _ => "server_error",
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::ValidationError(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RevoteDisallowed | Error::ClosedVote | Error::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        let message = if status.is_server_error() { "internal server error".to_owned() } else { self.to_string() };
        HttpResponse::build(status).json(ErrorBody { error: self.kind(), message })
    }
}
