use crate::decoding::{DecodeMode, DicomDecoder};
use crate::error::ProcessingError;
use bytes::Bytes;
use dicom_pixeldata::ndarray::{Array2, ArrayView2};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::imageops::FilterType as ResizeFilter;
use image::{DynamicImage, GrayImage};
use tracing::{instrument, trace};

/// The first eight bytes of every PNG file.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Renders the first frame of the upload as a grayscale PNG whose sides do not exceed `max_size`.
#[instrument(skip(decoder, bytes))]
pub fn render_thumbnail(
	decoder: &DicomDecoder,
	bytes: &Bytes,
	max_size: u32,
) -> Result<Vec<u8>, ProcessingError> {
	let dataset = decoder.decode(bytes, DecodeMode::Lenient)?;
	if !dataset.has_pixel_data() {
		return Err(ProcessingError::MissingPixelData);
	}
	if !dataset.can_decode_pixel_data() {
		return Err(ProcessingError::DependencyUnavailable(format!(
			"pixel data decoder for transfer syntax {}",
			dataset.transfer_syntax()
		)));
	}

	let pixels = dataset.pixels()?;
	trace!(shape = ?pixels.shape(), "Decoded pixel data");
	let image = grayscale_image(&normalize(pixels.first_plane()?))?;
	let thumbnail = shrink_to_fit(image, max_size);

	encode_png(&thumbnail)
}

/// Rescales the samples linearly so that the minimum maps to 0 and the maximum to 255.
///
/// A constant plane maps to all zeros.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn normalize(plane: ArrayView2<'_, f32>) -> Array2<u8> {
	let min = plane.fold(f32::INFINITY, |min, &sample| min.min(sample));
	let mut shifted = plane.mapv(|sample| sample - min);

	let max = shifted.fold(0.0_f32, |max, &sample| max.max(sample));
	if max > 0.0 {
		shifted /= max;
	}

	shifted.mapv(|sample| (sample * 255.0) as u8)
}

fn grayscale_image(samples: &Array2<u8>) -> Result<DynamicImage, ProcessingError> {
	let (rows, columns) = samples.dim();
	let (Ok(height), Ok(width)) = (u32::try_from(rows), u32::try_from(columns)) else {
		return Err(dimension_mismatch());
	};

	let raster = GrayImage::from_raw(width, height, samples.iter().copied().collect())
		.ok_or_else(dimension_mismatch)?;
	Ok(DynamicImage::ImageLuma8(raster).grayscale())
}

fn dimension_mismatch() -> ProcessingError {
	ProcessingError::Encode(ImageError::Parameter(ParameterError::from_kind(
		ParameterErrorKind::DimensionMismatch,
	)))
}

/// Dimensions that fit into a `bound` x `bound` square while keeping the aspect ratio.
/// Images that already fit are left unchanged.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn fit_within(width: u32, height: u32, bound: u32) -> (u32, u32) {
	let bound = bound.max(1);
	if width <= bound && height <= bound {
		return (width, height);
	}

	let scale = f64::from(bound) / f64::from(width.max(height));
	let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).clamp(1, bound);
	(scaled(width), scaled(height))
}

fn shrink_to_fit(image: DynamicImage, bound: u32) -> DynamicImage {
	let (width, height) = fit_within(image.width(), image.height(), bound);
	if (width, height) == (image.width(), image.height()) {
		return image;
	}

	trace!(width, height, "Resizing");
	image.resize_exact(width, height, ResizeFilter::CatmullRom)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ProcessingError> {
	let mut render_buffer = Vec::new();
	let encoder = PngEncoder::new_with_quality(
		&mut render_buffer,
		CompressionType::default(),
		FilterType::default(),
	);
	image.write_with_encoder(encoder)?;

	Ok(render_buffer)
}
