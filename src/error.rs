use thiserror::Error;

/// Failure of one of the processing operations.
///
/// Every variant is raised where it is detected and travels unchanged to the HTTP layer.
#[derive(Debug, Error)]
pub enum ProcessingError {
	/// A decode or imaging capability is not available in this build.
	#[error("required capability is unavailable: {0}")]
	DependencyUnavailable(String),
	#[error(transparent)]
	Decode(#[from] DecodeError),
	/// The data set was read but carries no Pixel Data element.
	#[error("DICOM has no PixelData")]
	MissingPixelData,
	#[error("failed to encode image: {0}")]
	Encode(#[from] image::ImageError),
}

/// The input could not be interpreted as a DICOM data set.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("failed to read DICOM data set: {0}")]
	Read(#[from] dicom::object::ReadError),
	#[error("failed to decode pixel data: {0}")]
	PixelData(#[from] dicom_pixeldata::Error),
	#[error("missing DICOM file meta information")]
	MissingFileMeta,
	#[error("invalid file meta information: {0}")]
	FileMeta(String),
	#[error("unsupported pixel data shape {0:?}")]
	PixelShape(Vec<usize>),
	#[error("value of {tag} declares {length} bytes but only {available} bytes remain")]
	ValueLength {
		tag: dicom::core::Tag,
		length: u32,
		available: usize,
	},
}
