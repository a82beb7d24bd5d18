use crate::AppState;
use axum::Router;

pub mod common;
mod home;
pub mod thumbnail;
pub mod upload;

pub fn routes(base_path: &str) -> Router<AppState> {
	let router = Router::new()
		.merge(home::routes())
		.merge(upload::routes())
		.merge(thumbnail::routes());

	// axum no longer supports nesting at the root
	match base_path {
		"/" | "" => router,
		base_path => Router::new().nest(base_path.trim_end_matches('/'), router),
	}
}

#[cfg(test)]
mod tests {
	use crate::config::AppConfig;
	use crate::decoding::DicomDecoder;
	use crate::rendering::PNG_SIGNATURE;
	use crate::testing::{file_bytes, image_elements, ramp, study_elements};
	use crate::{app, AppState};
	use axum::body::{to_bytes, Body};
	use axum::http::header::CONTENT_TYPE;
	use axum::http::{Request, StatusCode};
	use axum::response::Response;
	use bytes::Bytes;
	use serde_json::{json, Value};
	use tower::ServiceExt;

	fn state() -> AppState {
		AppState {
			config: AppConfig::defaults(),
			decoder: DicomDecoder::probe().unwrap(),
		}
	}

	async fn post(uri: &str, content_type: &str, body: impl Into<Body>) -> Response {
		app(state())
			.oneshot(
				Request::builder()
					.method("POST")
					.uri(uri)
					.header(CONTENT_TYPE, content_type)
					.body(body.into())
					.unwrap(),
			)
			.await
			.unwrap()
	}

	async fn json_body(response: Response) -> Value {
		let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		serde_json::from_slice(&body).unwrap()
	}

	fn form_data(file: &Bytes) -> (String, Vec<u8>) {
		let boundary = "------------------------a8f3c2e1d4b5";
		let mut body = Vec::new();
		body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
		body.extend_from_slice(
			b"Content-Disposition: form-data; name=\"file\"; filename=\"image.dcm\"\r\n",
		);
		body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
		body.extend_from_slice(file);
		body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
		(format!("multipart/form-data; boundary={boundary}"), body)
	}

	#[tokio::test]
	async fn index() {
		let response = app(state())
			.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		assert!(response.headers()["Server"]
			.to_str()
			.unwrap()
			.starts_with("dicom-explorer/"));
	}

	#[tokio::test]
	async fn upload_returns_metadata() {
		let (content_type, body) = form_data(&file_bytes(study_elements()));
		let response = post("/upload/", &content_type, body).await;

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			json_body(response).await,
			json!({
				"metadata": {"PatientID": "ABC123", "StudyDate": "20250101", "Modality": "US"},
				"thumbnail_endpoint": "/thumbnail/",
			})
		);
	}

	#[tokio::test]
	async fn upload_raw_body() {
		let response = post("/upload/", "application/dicom", file_bytes(study_elements())).await;

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(json_body(response).await["metadata"]["Modality"], "US");
	}

	#[tokio::test]
	async fn upload_unreadable_file() {
		let mut file = vec![0_u8; 128];
		file.extend_from_slice(b"DICM not really");
		let response = post("/upload/", "application/dicom", file).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let detail = json_body(response).await["detail"].as_str().unwrap().to_owned();
		assert!(detail.starts_with("Failed to parse DICOM: "));
	}

	#[tokio::test]
	async fn thumbnail_returns_png() {
		let file = file_bytes(image_elements(32, 64, 1, &ramp(32, 64, 1000)));
		let (content_type, body) = form_data(&file);
		let response = post("/thumbnail/?size=16", &content_type, body).await;

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
		let png = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		assert_eq!(png[..8], PNG_SIGNATURE);

		let image = image::load_from_memory(&png).unwrap();
		assert_eq!((image.width(), image.height()), (16, 8));
	}

	#[tokio::test]
	async fn thumbnail_without_pixel_data() {
		let response = post("/thumbnail/", "application/dicom", file_bytes(study_elements())).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		assert_eq!(
			json_body(response).await,
			json!({"detail": "Failed to generate thumbnail: DICOM has no PixelData"})
		);
	}

	#[tokio::test]
	async fn thumbnail_size_out_of_range() {
		let file = file_bytes(image_elements(2, 2, 1, &[0, 1, 2, 3]));
		let response = post("/thumbnail/?size=0", "application/dicom", file).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn nested_base_path() {
		let mut state = state();
		state.config.server.http.base_path = String::from("/explorer/");
		let response = app(state)
			.oneshot(
				Request::builder()
					.method("POST")
					.uri("/explorer/upload/")
					.header(CONTENT_TYPE, "application/dicom")
					.body(Body::from(file_bytes(study_elements())))
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			json_body(response).await["thumbnail_endpoint"],
			"/explorer/thumbnail/"
		);
	}
}
