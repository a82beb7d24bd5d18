use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Error body shared by all endpoints: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	#[serde(skip)]
	status: StatusCode,
	detail: String,
}

impl ErrorResponse {
	pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
		Self {
			status,
			detail: detail.into(),
		}
	}

	pub fn bad_request(detail: impl Into<String>) -> Self {
		Self::new(StatusCode::BAD_REQUEST, detail)
	}
}

impl IntoResponse for ErrorResponse {
	fn into_response(self) -> Response {
		(self.status, Json(self)).into_response()
	}
}
