use crate::api::common::ErrorResponse;
use crate::api::thumbnail::THUMBNAIL_PATH;
use crate::metadata::{extract_metadata, Metadata};
use crate::utils::upload::DicomUpload;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde::Serialize;
use tracing::{error, instrument, warn};

pub const UPLOAD_PATH: &str = "/upload/";

pub fn routes() -> Router<AppState> {
	Router::new().route(UPLOAD_PATH, post(upload))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
	pub metadata: Metadata,
	/// Where the same file can be posted to obtain a thumbnail.
	pub thumbnail_endpoint: String,
}

#[instrument(skip_all, fields(length = content.len()))]
async fn upload(State(state): State<AppState>, DicomUpload(content): DicomUpload) -> Response {
	let decoder = state.decoder;
	let result = tokio::task::spawn_blocking(move || extract_metadata(&decoder, &content)).await;

	match result {
		Ok(Ok(metadata)) => Json(UploadResponse {
			metadata,
			thumbnail_endpoint: endpoint(&state.config.server.http.base_path, THUMBNAIL_PATH),
		})
		.into_response(),
		Ok(Err(err)) => {
			warn!("Failed to parse DICOM: {err}");
			ErrorResponse::bad_request(format!("Failed to parse DICOM: {err}")).into_response()
		}
		Err(err) => {
			error!("Metadata extraction did not complete: {err}");
			ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
		}
	}
}

fn endpoint(base_path: &str, path: &str) -> String {
	format!("{}{path}", base_path.trim_end_matches('/'))
}
