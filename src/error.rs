use axum::{
	http::{header::RETRY_AFTER, HeaderValue},
	response::{IntoResponse, Response},
	Json,
};
use hyper::StatusCode;
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
	#[error("{0}")]
	BadRequest(String),

	#[error("{0}")]
	Unauthorized(String),

	#[error("{0}")]
	Forbidden(String),

	#[error("{0}")]
	NotFound(String),

	#[error("{0}")]
	Conflict(String),

	#[error("Too many requests, please try again later.")]
	RateLimited { retry_after_secs: u64 },

	#[error("{0}")]
	Upstream(String),

	#[error("{0}")]
	Unavailable(String),

	#[error("Internal error: {0}")]
	Internal(#[from] anyhow::Error),
}

impl AppError {
	pub fn bad_request(msg: impl Into<String>) -> Self {
		Self::BadRequest(msg.into())
	}

	pub fn not_found(msg: impl Into<String>) -> Self {
		Self::NotFound(msg.into())
	}

	pub fn status(&self) -> StatusCode {
		match self {
			AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
			AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
			AppError::Forbidden(_) => StatusCode::FORBIDDEN,
			AppError::NotFound(_) => StatusCode::NOT_FOUND,
			AppError::Conflict(_) => StatusCode::CONFLICT,
			AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
			AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
			AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
			AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl From<StoreError> for AppError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::Conflict(msg) => AppError::Conflict(msg),
			other => AppError::Internal(other.into()),
		}
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response {
		let status = self.status();

		// internals stay in the log
		let message = match &self {
			AppError::Internal(err) => {
				error!("{err:#}");
				"Internal server error".to_string()
			}
			other => other.to_string(),
		};

		let mut response = (status, Json(json!({ "success": false, "error": message }))).into_response();

		if let AppError::RateLimited { retry_after_secs } = self {
			if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
				response.headers_mut().insert(RETRY_AFTER, value);
			}
		}

		response
	}
}

pub type AppResult<T> = Result<T, AppError>;
