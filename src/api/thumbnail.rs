use crate::api::common::ErrorResponse;
use crate::config::ThumbnailConfig;
use crate::rendering::render_thumbnail;
use crate::utils::upload::DicomUpload;
use crate::AppState;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde::Deserialize;
use tracing::{error, instrument, warn};

pub const THUMBNAIL_PATH: &str = "/thumbnail/";

pub fn routes() -> Router<AppState> {
	Router::new().route(THUMBNAIL_PATH, post(thumbnail))
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ThumbnailQueryParameters {
	/// Maximum side length of the thumbnail in pixels.
	#[serde(alias = "scale_to")]
	pub size: Option<u32>,
}

impl ThumbnailQueryParameters {
	fn resolve_size(&self, config: ThumbnailConfig) -> Result<u32, ErrorResponse> {
		let size = self.size.unwrap_or(config.default_size);
		if (1..=config.max_size).contains(&size) {
			Ok(size)
		} else {
			Err(ErrorResponse::bad_request(format!(
				"size {size} is outside of the range 1..={}",
				config.max_size
			)))
		}
	}
}

#[instrument(skip_all, fields(length = content.len()))]
async fn thumbnail(
	State(state): State<AppState>,
	Query(params): Query<ThumbnailQueryParameters>,
	DicomUpload(content): DicomUpload,
) -> Response {
	let size = match params.resolve_size(state.config.thumbnail) {
		Ok(size) => size,
		Err(rejection) => return rejection.into_response(),
	};

	let decoder = state.decoder;
	let result =
		tokio::task::spawn_blocking(move || render_thumbnail(&decoder, &content, size)).await;

	match result {
		Ok(Ok(png)) => ([(CONTENT_TYPE, mime::IMAGE_PNG.as_ref())], png).into_response(),
		Ok(Err(err)) => {
			warn!("Failed to generate thumbnail: {err}");
			ErrorResponse::bad_request(format!("Failed to generate thumbnail: {err}"))
				.into_response()
		}
		Err(err) => {
			error!("Thumbnail rendering did not complete: {err}");
			ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
		}
	}
}
