pub mod dialogue;
pub mod frequency;
pub mod health;
pub mod sessions;
pub mod tools;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use colloquy_core::error::ColloquyError;

/// Error body shared by every endpoint: `success:false` plus a message and
/// a short stable code.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn error_response(status: StatusCode, err: ColloquyError) -> ApiError {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: err.to_string(),
            code: err.code(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(
        StatusCode::BAD_REQUEST,
        ColloquyError::Malformed(message.into()),
    )
}

pub fn not_found(what: impl Into<String>) -> ApiError {
    error_response(
        StatusCode::NOT_FOUND,
        ColloquyError::NotFound { what: what.into() },
    )
}

pub fn internal(message: impl Into<String>) -> ApiError {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        ColloquyError::Internal(message.into()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bodies_carry_stable_codes() {
        let (status, Json(body)) = bad_request("input must not be empty");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(body.code, "MALFORMED_INPUT");
        assert!(body.error.contains("input must not be empty"));

        let (status, Json(body)) = not_found("session s-1");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "NOT_FOUND");

        let (status, Json(body)) = internal("boom");
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "INTERNAL_ERROR");
    }
}
