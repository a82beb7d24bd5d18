use crate::AppState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

pub fn routes() -> Router<AppState> {
	Router::new().route("/", get(index))
}

async fn index() -> impl IntoResponse {
	format!(
		"This server is running dicom-explorer (v{}). POST a DICOM file to /upload/ or /thumbnail/.",
		env!("CARGO_PKG_VERSION")
	)
}
