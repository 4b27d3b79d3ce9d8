//! ABOUTME: Error handling utilities for RFC 7807 Problem Details responses
//! ABOUTME: Maps core errors and validation failures to HTTP status codes

use crate::models::{ProblemDetails, ValidationError};
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use tracing::error;
use validator::ValidationErrors;

/// API error wrapper for RFC 7807 Problem Details
#[derive(Debug)]
pub struct ApiError {
    pub problem: ProblemDetails,
    pub status_code: u16,
}

impl ApiError {
    /// Create a new API error
    pub fn new(problem: ProblemDetails) -> Self {
        let status_code = problem.status.unwrap_or(500);
        Self {
            problem,
            status_code,
        }
    }

    fn with_status(type_url: &str, title: &str, status: u16, detail: String) -> Self {
        Self::new(
            ProblemDetails::new(type_url, title)
                .with_status(status)
                .with_detail(detail),
        )
    }

    /// Create a validation error from validator::ValidationErrors
    pub fn validation(errors: ValidationErrors) -> Self {
        let validation_errors: Vec<ValidationError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |error| ValidationError {
                    field: field.to_string(),
                    code: error.code.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for field '{}'", field)),
                    value: error.params.get("value").cloned(),
                })
            })
            .collect();

        let problem = ProblemDetails::validation_error("Request validation failed").with_extension(
            "errors",
            serde_json::to_value(validation_errors).unwrap_or_default(),
        );

        Self::new(problem)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ProblemDetails::validation_error(detail.into()))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::with_status(
            "https://datatracker.ietf.org/rfc/rfc7235.html#section-3.1",
            "Unauthorized",
            401,
            detail.into(),
        )
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::with_status(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.3",
            "Forbidden",
            403,
            detail.into(),
        )
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::with_status(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.4",
            "Not Found",
            404,
            detail.into(),
        )
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::with_status(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.5.8",
            "Conflict",
            409,
            detail.into(),
        )
    }

    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::with_status(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.6.3",
            "Bad Gateway",
            502,
            detail.into(),
        )
    }

    pub fn internal_server_error(detail: impl Into<String>) -> Self {
        Self::with_status(
            "https://datatracker.ietf.org/rfc/rfc7231.html#section-6.6.1",
            "Internal Server Error",
            500,
            detail.into(),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.problem.title,
            self.problem
                .detail
                .as_deref()
                .unwrap_or("No details available")
        )
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::from_u16(self.status_code)
            .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("application/problem+json")
            .json(&self.problem)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

/// Server-side failures are logged in full and reported without internals
impl From<pm_core::Error> for ApiError {
    fn from(err: pm_core::Error) -> Self {
        use pm_core::Error;

        match err {
            Error::Validation(msg) | Error::InvalidState(msg) => Self::bad_request(msg),
            Error::NotFound(msg) => Self::not_found(msg),
            Error::Conflict(msg) => Self::conflict(msg),
            Error::Forbidden(msg) => Self::forbidden(msg),
            Error::External(msg) => {
                error!("External service error: {}", msg);
                Self::bad_gateway("Upstream service failed")
            }
            Error::Database(msg) => {
                error!("Database error: {}", msg);
                Self::internal_server_error("Database error")
            }
            Error::Config(msg) => {
                error!("Configuration error: {}", msg);
                Self::internal_server_error("Server misconfiguration")
            }
            Error::Io(e) => {
                error!("IO error: {}", e);
                Self::internal_server_error("IO error")
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Validate a request DTO, turning failures into a 400 problem
pub fn validate<T: validator::Validate>(payload: &T) -> ApiResult<()> {
    payload.validate().map_err(ApiError::validation)
}
