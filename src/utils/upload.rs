use crate::api::common::ErrorResponse;
use axum::extract::rejection::{BytesRejection, LengthLimitError};
use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::RequestExt;
use bytes::Bytes;
use tracing::warn;

/// Name of the form field that carries the file in `multipart/form-data` uploads.
const FILE_FIELD: &str = "file";

/// The raw bytes of one uploaded file.
///
/// The file is taken from
/// - the `file` field of a `multipart/form-data` body,
/// - the first part of any other multipart body (e.g. `multipart/related` as used by DICOMweb),
/// - the whole request body otherwise.
///
/// Multipart bodies are parsed with `multer` (the same parser `axum::extract::Multipart` uses),
/// because `axum::extract::Multipart` only accepts `multipart/form-data`.
pub struct DicomUpload(pub Bytes);

impl DicomUpload {
	/// Based on [`multer::parse_boundary`], but accepting every multipart subtype.
	fn parse_boundary(content_type: &mime::Mime) -> Option<String> {
		if content_type.type_() != mime::MULTIPART {
			return None;
		}

		content_type
			.get_param(mime::BOUNDARY)
			.map(|name| name.as_str().to_owned())
	}

	async fn from_multipart(
		mut multipart: multer::Multipart<'static>,
		field_name: Option<&str>,
	) -> Result<Self, DicomUploadRejection> {
		while let Some(field) = multipart.next_field().await.map_err(stream_error)? {
			if field_name.is_none_or(|name| field.name() == Some(name)) {
				let data = field.bytes().await.map_err(stream_error)?;
				return Ok(Self(data));
			}
		}

		Err(DicomUploadRejection::MissingFile)
	}
}

#[derive(Debug)]
pub enum DicomUploadRejection {
	InvalidBoundary,
	MissingFile,
	UploadLimitExceeded,
	Stream(multer::Error),
	Body(BytesRejection),
}

impl IntoResponse for DicomUploadRejection {
	fn into_response(self) -> Response {
		match self {
			Self::InvalidBoundary => ErrorResponse::bad_request(
				"Invalid `boundary` for multipart request",
			)
			.into_response(),
			Self::MissingFile => ErrorResponse::new(
				StatusCode::UNPROCESSABLE_ENTITY,
				format!("Missing `{FILE_FIELD}` field in multipart request"),
			)
			.into_response(),
			Self::UploadLimitExceeded => ErrorResponse::new(
				StatusCode::PAYLOAD_TOO_LARGE,
				"The file exceeds the configured upload size limit",
			)
			.into_response(),
			Self::Stream(err) => ErrorResponse::bad_request(err.to_string()).into_response(),
			Self::Body(rejection) => rejection.into_response(),
		}
	}
}

fn stream_error(err: multer::Error) -> DicomUploadRejection {
	if let multer::Error::StreamReadFailed(stream_error) = &err {
		let is_limit_exceeded = stream_error
			.downcast_ref::<axum::Error>()
			.and_then(std::error::Error::source)
			.and_then(|err| err.downcast_ref::<LengthLimitError>())
			.is_some();

		if is_limit_exceeded {
			warn!("Upload limit exceeded.");
			return DicomUploadRejection::UploadLimitExceeded;
		}
	}

	warn!("Failed to read multipart stream: {err:?}");
	DicomUploadRejection::Stream(err)
}

impl<S> FromRequest<S> for DicomUpload
where
	S: Send + Sync,
{
	type Rejection = DicomUploadRejection;

	async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
		let content_type = request
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| value.parse::<mime::Mime>().ok());

		match content_type {
			Some(content_type) if content_type.type_() == mime::MULTIPART => {
				let boundary = Self::parse_boundary(&content_type)
					.ok_or(DicomUploadRejection::InvalidBoundary)?;
				let field_name =
					(content_type.subtype() == mime::FORM_DATA).then_some(FILE_FIELD);

				let stream = request.with_limited_body().into_body();
				let multipart = multer::Multipart::new(stream.into_data_stream(), boundary);
				Self::from_multipart(multipart, field_name).await
			}
			_ => Bytes::from_request(request, state)
				.await
				.map(Self)
				.map_err(DicomUploadRejection::Body),
		}
	}
}
