// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::models::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tiergate_core::types::{CoreError, ErrorKind};
use validator::ValidationErrors;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Convert CoreError to a status code and JSON body
pub fn core_error_parts(error: CoreError) -> ApiError {
    let (status_code, core_response) = error.to_http_response();

    let status = match status_code {
        400 => StatusCode::BAD_REQUEST,
        404 => StatusCode::NOT_FOUND,
        409 => StatusCode::CONFLICT,
        503 => StatusCode::SERVICE_UNAVAILABLE,
        504 => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse::new(
            core_response.error_kind,
            core_response.message,
        )),
    )
}

/// Convert CoreError to HTTP response
pub fn handle_core_error(error: CoreError) -> Response {
    core_error_parts(error).into_response()
}

pub fn validation_error(errors: ValidationErrors) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(
            ErrorKind::InvalidInput,
            format!("Validation error: {}", errors),
        )),
    )
}

/// Convert any error to HTTP response
pub fn handle_any_error<E: std::fmt::Display>(error: E) -> Response {
    tracing::error!("Unhandled error: {}", error);
    let response = ErrorResponse::new(
        ErrorKind::Internal,
        format!("Internal server error: {}", error),
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_core_error_invalid_input() {
        let response = handle_core_error(CoreError::InvalidInput("bad key".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_handle_core_error_not_found() {
        let response = handle_core_error(CoreError::NotFound("user:1".to_string()));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_handle_core_error_conflict() {
        let response = handle_core_error(CoreError::Conflict("user:1".to_string()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_handle_core_error_unavailable() {
        let (status, body) = core_error_parts(CoreError::Unavailable("store".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.0.error_kind, ErrorKind::Unavailable);
        assert_eq!(body.0.status, "error");
    }

    #[test]
    fn test_cache_error_is_unavailable() {
        let response = handle_core_error(CoreError::CacheError("refused".to_string()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_handle_core_error_timeout() {
        let response = handle_core_error(CoreError::Timeout);
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_handle_core_error_internal() {
        let response = handle_core_error(CoreError::InternalError("boom".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = handle_core_error(CoreError::ConfigurationError("x".to_string()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_handle_any_error() {
        let response = handle_any_error("encoder failed");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
