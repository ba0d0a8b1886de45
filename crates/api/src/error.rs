// SPDX-FileCopyrightText: 2025 Aaron Dewes <aaron@nirvati.org>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use hyper::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::api::auth::JwtGenerationError;
use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body sent to the client. Internal details are not exposed.
    pub fn body(&self) -> String {
        let status = self.status();
        let message = match self {
            ApiError::Internal(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            message,
        };
        serde_json::to_string(&body).unwrap_or_default()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("Record not found".to_string()),
            StoreError::Conflict(detail) => {
                ApiError::Conflict(format!("Duplicate record: {detail}"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<argon2::password_hash::Error> for ApiError {
    fn from(err: argon2::password_hash::Error) -> Self {
        ApiError::Internal(format!("password hashing failed: {err}"))
    }
}

impl From<JwtGenerationError> for ApiError {
    fn from(err: JwtGenerationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_are_masked() {
        let err = ApiError::from(StoreError::Pool("connection refused".to_string()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&err.body()).unwrap();
        assert_eq!(body["statusCode"], 500);
        assert!(!body["message"].as_str().unwrap().contains("refused"));
    }

    #[test]
    fn test_forbidden_body() {
        let body: serde_json::Value = serde_json::from_str(&ApiError::Forbidden.body()).unwrap();
        assert_eq!(body["statusCode"], 403);
        assert_eq!(body["error"], "Forbidden");
    }

    #[test]
    fn test_payload_too_large_body() {
        let err = ApiError::PayloadTooLarge(1024);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body: serde_json::Value = serde_json::from_str(&err.body()).unwrap();
        assert_eq!(body["statusCode"], 413);
        assert_eq!(body["message"], "Request body exceeds 1024 bytes");
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        assert_eq!(
            ApiError::from(StoreError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
    }
}
