// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::database::models::PasswordError;
use crate::database::DatabaseError;
use crate::filter::FilterError;
use crate::validator::Validator;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    InvalidCredentials,
    InvalidAuthenticationToken,
    AuthenticationRequired,

    // 403 Forbidden
    InactiveAccount,
    NotPermitted,

    // 404 Not Found
    NotFound(String),

    // 405 Method Not Allowed
    MethodNotAllowed(String),

    // 409 Conflict
    EditConflict,

    // 422 Unprocessable Entity
    UnprocessableEntity {
        message: String,
        field_errors: BTreeMap<String, String>,
    },

    // 429 Too Many Requests
    TooManyRequests,

    // 500 Internal Server Error
    InternalServerError(String),

    /// An invariant was violated. The request is aborted and the connection
    /// closed; the detail is logged, never sent.
    Fault(String),
}

const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::InvalidAuthenticationToken => StatusCode::UNAUTHORIZED,
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount => StatusCode::FORBIDDEN,
            ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::InvalidCredentials => "invalid authentication credentials",
            ApiError::InvalidAuthenticationToken => "invalid or missing authentication token",
            ApiError::AuthenticationRequired => "you must be authenticated to access this resource",
            ApiError::InactiveAccount => "your user account must be activated to access this resource",
            ApiError::NotPermitted => {
                "your user account doesn't have the necessary permissions to access this resource"
            }
            ApiError::NotFound(msg) => msg,
            ApiError::MethodNotAllowed(msg) => msg,
            ApiError::EditConflict => "unable to update the record due to an edit conflict, please try again",
            ApiError::UnprocessableEntity { message, .. } => message,
            ApiError::TooManyRequests => "rate limit exceeded",
            ApiError::InternalServerError(_) | ApiError::Fault(_) => SERVER_ERROR_MESSAGE,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::InvalidAuthenticationToken => "INVALID_AUTHENTICATION_TOKEN",
            ApiError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ApiError::InactiveAccount => "INACTIVE_ACCOUNT",
            ApiError::NotPermitted => "NOT_PERMITTED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ApiError::EditConflict => "EDIT_CONFLICT",
            ApiError::UnprocessableEntity { .. } => "UNPROCESSABLE_ENTITY",
            ApiError::TooManyRequests => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::Fault(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::UnprocessableEntity { message, field_errors } => json!({
                "error": true,
                "message": message,
                "code": self.error_code(),
                "field_errors": field_errors
            }),
            _ => json!({
                "error": true,
                "message": self.message(),
                "code": self.error_code()
            }),
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn record_not_found() -> Self {
        ApiError::NotFound("the requested resource could not be found".to_string())
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        ApiError::MethodNotAllowed(message.into())
    }

    pub fn failed_validation(field_errors: BTreeMap<String, String>) -> Self {
        ApiError::UnprocessableEntity {
            message: "request failed validation".to_string(),
            field_errors,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn fault(message: impl Into<String>) -> Self {
        ApiError::Fault(message.into())
    }
}

impl From<Validator> for ApiError {
    fn from(v: Validator) -> Self {
        ApiError::failed_validation(v.into_errors())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => ApiError::record_not_found(),
            DatabaseError::EditConflict => ApiError::EditConflict,
            DatabaseError::DuplicateEmail => {
                let mut field_errors = BTreeMap::new();
                field_errors.insert("email".to_string(), "a user with this email address already exists".to_string());
                ApiError::failed_validation(field_errors)
            }
            DatabaseError::Filter(e) => e.into(),
            // Don't expose internal SQL errors to clients
            other => ApiError::internal_server_error(other.to_string()),
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::fault(err.to_string())
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::MissingHash => ApiError::fault(err.to_string()),
            other => ApiError::internal_server_error(other.to_string()),
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InternalServerError(detail) | ApiError::Fault(detail) => write!(f, "{}", detail),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match &self {
            ApiError::InternalServerError(detail) => tracing::error!(error = %detail, "request failed"),
            ApiError::Fault(detail) => tracing::error!(error = %detail, "invariant violated, closing connection"),
            _ => {}
        }

        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        match self {
            ApiError::InvalidAuthenticationToken => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            ApiError::Fault(_) => {
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }
        response
    }
}
