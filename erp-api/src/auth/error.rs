//! Error kinds surfaced by the authentication core.
//!
//! Every failure inside the credential store, session registry, token codec
//! and permission resolver is mapped onto [`AuthError`] before it reaches a
//! route. Store details never cross that boundary; they are logged instead.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, status};
use rocket::serde::json::Json;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Unknown identifier, wrong password, or an account that may not sign in.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Bad signature, wrong token type, expired, or missing token.
    #[error("Token expired or invalid")]
    TokenExpiredOrInvalid,

    /// The token verifies but its session is no longer live.
    #[error("Session has been revoked")]
    SessionRevoked,

    #[error("Session limit reached for this company")]
    SessionLimitExceeded,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Token has already been used")]
    TokenAlreadyUsed,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    /// The store did not answer in time. Callers may retry.
    #[error("Service temporarily unavailable")]
    Unavailable,

    #[error("Internal server error")]
    Internal,
}

/// JSON body returned for every [`AuthError`].
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl AuthError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        AuthError::Forbidden(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AuthError::NotFound(what.into())
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        AuthError::BadRequest(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        AuthError::Conflict(reason.into())
    }

    /// Stable machine readable identifier of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::TokenExpiredOrInvalid => "token_expired_or_invalid",
            AuthError::SessionRevoked => "session_revoked",
            AuthError::SessionLimitExceeded => "session_limit_exceeded",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::TokenAlreadyUsed => "token_already_used",
            AuthError::NotFound(_) => "not_found",
            AuthError::Conflict(_) => "conflict",
            AuthError::BadRequest(_) => "bad_request",
            AuthError::Unavailable => "unavailable",
            AuthError::Internal => "internal",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials
            | AuthError::TokenExpiredOrInvalid
            | AuthError::SessionRevoked => Status::Unauthorized,
            AuthError::SessionLimitExceeded => Status::TooManyRequests,
            AuthError::Forbidden(_) => Status::Forbidden,
            AuthError::TokenAlreadyUsed => Status::Gone,
            AuthError::NotFound(_) => Status::NotFound,
            AuthError::Conflict(_) => Status::Conflict,
            AuthError::BadRequest(_) => Status::BadRequest,
            AuthError::Unavailable => Status::ServiceUnavailable,
            AuthError::Internal => Status::InternalServerError,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        }
    }
}

impl From<DieselError> for AuthError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => AuthError::not_found("Record"),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                AuthError::conflict("Record already exists")
            }
            DieselError::DatabaseError(_, ref info) if is_lock_contention(info.message()) => {
                warn!("Store busy: {}", info.message());
                AuthError::Unavailable
            }
            other => {
                error!("Store error: {:?}", other);
                AuthError::Internal
            }
        }
    }
}

fn is_lock_contention(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("busy")
}

impl<'r> Responder<'r, 'static> for AuthError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        status::Custom(self.status(), Json(self.to_response())).respond_to(req)
    }
}
