//! HTTP handlers for the read-only query API.

pub mod inclusion;
pub mod tx;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
}

/// Errors returned by the API, mapped onto HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("{0}")]
	BadRequest(String),
	#[error("{0}")]
	NotFound(String),
	#[error("{0}")]
	Internal(String),
}

impl ApiError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn error_code(&self) -> &'static str {
		match self {
			ApiError::BadRequest(_) => "BAD_REQUEST",
			ApiError::NotFound(_) => "NOT_FOUND",
			ApiError::Internal(_) => "INTERNAL_ERROR",
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorResponse {
			error: self.error_code().to_string(),
			message: self.to_string(),
		};
		(self.status_code(), Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_mapping() {
		assert_eq!(
			ApiError::BadRequest("x".into()).into_response().status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(
			ApiError::NotFound("x".into()).into_response().status(),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			ApiError::Internal("x".into()).into_response().status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}
}
