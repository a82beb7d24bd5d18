//! Decoding of uploaded bytes into DICOM data sets and pixel buffers.

use crate::error::{DecodeError, ProcessingError};
use bytes::{Buf, Bytes};
use dicom::core::{DataElementHeader, Tag};
use dicom::dictionary_std::{tags, uids};
use dicom::encoding::decode::DecodeFrom;
use dicom::encoding::transfer_syntax::{Codec, TransferSyntax, TransferSyntaxIndex};
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::TransferSyntaxRegistry;
use dicom_pixeldata::ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use image::ImageFormat;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use tracing::{debug, instrument};

const REGISTRY: &TransferSyntaxRegistry = &TransferSyntaxRegistry;

const PREAMBLE_LENGTH: usize = 128;
const MAGIC_CODE: &[u8] = b"DICM";
const FILE_META_GROUP: u16 = 0x0002;

/// Used for the file meta group of bare data sets that carry no SOP Instance UID.
const PLACEHOLDER_INSTANCE_UID: &str = "2.25.0";

/// How strictly the input must follow the DICOM file format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeMode {
	/// The input must contain the `DICM` magic code and a file meta group.
	Strict,
	/// Inputs without a file meta group are read as a bare data set.
	Lenient,
}

/// Entry point for decoding uploads.
///
/// A decoder can only be obtained through [`DicomDecoder::probe`], which checks that every
/// capability the processing operations rely on is compiled into this build.
#[derive(Copy, Clone)]
pub struct DicomDecoder {
	implicit_vr_le: &'static TransferSyntax,
	explicit_vr_le: &'static TransferSyntax,
}

impl Debug for DicomDecoder {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DicomDecoder")
			.field("implicit_vr_le", &self.implicit_vr_le.uid())
			.field("explicit_vr_le", &self.explicit_vr_le.uid())
			.finish()
	}
}

impl DicomDecoder {
	pub fn probe() -> Result<Self, ProcessingError> {
		if !ImageFormat::Png.writing_enabled() {
			return Err(ProcessingError::DependencyUnavailable(String::from(
				"PNG encoder",
			)));
		}

		Ok(Self {
			implicit_vr_le: lookup_transfer_syntax(uids::IMPLICIT_VR_LITTLE_ENDIAN)?,
			explicit_vr_le: lookup_transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)?,
		})
	}

	#[instrument(skip_all, fields(length = bytes.len(), mode = ?mode))]
	pub fn decode(&self, bytes: &Bytes, mode: DecodeMode) -> Result<Dataset, DecodeError> {
		if let Some(offset) = file_meta_offset(bytes) {
			let (ts_uid, dataset) = self.check_file_meta(&bytes[offset..])?;
			if let Some(ts) = ts_uid.as_deref().and_then(|uid| REGISTRY.get(uid)) {
				check_value_lengths(dataset, ts)?;
			}

			let file = DefaultDicomObject::from_reader(bytes.slice(offset..).reader())?;
			return Ok(Dataset(file));
		}

		if mode == DecodeMode::Strict {
			return Err(DecodeError::MissingFileMeta);
		}

		// Without a file meta group the transfer syntax has to be guessed from the first element.
		let ts = if has_explicit_vr(bytes) {
			self.explicit_vr_le
		} else {
			self.implicit_vr_le
		};
		debug!(transfer_syntax = ts.uid(), "Reading bare data set");

		check_value_lengths(bytes, ts)?;
		let object = InMemDicomObject::read_dataset_with_ts(bytes.clone().reader(), ts)?;
		let meta = FileMetaTableBuilder::new()
			.transfer_syntax(ts.uid())
			.media_storage_sop_class_uid(text_or(
				&object,
				tags::SOP_CLASS_UID,
				uids::SECONDARY_CAPTURE_IMAGE_STORAGE,
			))
			.media_storage_sop_instance_uid(text_or(
				&object,
				tags::SOP_INSTANCE_UID,
				PLACEHOLDER_INSTANCE_UID,
			))
			.build()
			.map_err(|err| DecodeError::FileMeta(err.to_string()))?;

		Ok(Dataset(object.with_exact_meta(meta)))
	}

	/// Checks the value lengths of the file meta group that follows the magic code.
	///
	/// Returns the transfer syntax declared by the group and the encoded data set behind it.
	fn check_file_meta<'a>(
		&self,
		file: &'a [u8],
	) -> Result<(Option<String>, &'a [u8]), DecodeError> {
		let mut source = file.get(MAGIC_CODE.len()..).unwrap_or_default();
		let mut ts_uid = None;
		let Some(decoder) = self.explicit_vr_le.decoder_for::<&[u8]>() else {
			return Ok((ts_uid, source));
		};

		while let Some(&[low, high]) = source.get(..2) {
			if u16::from_le_bytes([low, high]) != FILE_META_GROUP {
				break;
			}
			let Ok((header, _)) = decoder.decode_header(&mut source) else {
				break;
			};

			let value = skip_value(&mut source, &header)?;
			if header.tag == tags::TRANSFER_SYNTAX_UID {
				let uid = String::from_utf8_lossy(value);
				ts_uid = Some(uid.trim_end_matches(['\0', ' ']).to_owned());
			}
		}

		Ok((ts_uid, source))
	}
}

/// Rejects element values whose declared length runs past the end of the input.
///
/// The data set reader reserves the declared length of a value before reading it,
/// so a few bytes claiming a huge value would otherwise allocate that much memory.
fn check_value_lengths(data: &[u8], ts: &TransferSyntax) -> Result<(), DecodeError> {
	// Deflated data sets declare lengths of the inflated stream.
	if matches!(ts.codec(), Codec::Dataset(_)) {
		return Ok(());
	}
	let Some(decoder) = ts.decoder_for::<&[u8]>() else {
		return Ok(());
	};

	let mut source = data;
	while !source.is_empty() {
		// Malformed headers are reported by the data set reader.
		let Ok((header, _)) = decoder.decode_header(&mut source) else {
			break;
		};
		skip_value(&mut source, &header)?;
	}
	Ok(())
}

/// Advances past the value of `header` and returns it.
///
/// Undefined lengths are followed by items and delimiters, which are walked like elements.
fn skip_value<'a>(
	source: &mut &'a [u8],
	header: &DataElementHeader,
) -> Result<&'a [u8], DecodeError> {
	let rest: &'a [u8] = *source;
	let Some(length) = header.len.get() else {
		return Ok(&[]);
	};

	let length = usize::try_from(length).unwrap_or(usize::MAX);
	if length > rest.len() {
		return Err(DecodeError::ValueLength {
			tag: header.tag,
			length: header.len.0,
			available: rest.len(),
		});
	}

	let (value, rest) = rest.split_at(length);
	*source = rest;
	Ok(value)
}

fn lookup_transfer_syntax(uid: &str) -> Result<&'static TransferSyntax, ProcessingError> {
	REGISTRY.get(uid).ok_or_else(|| {
		ProcessingError::DependencyUnavailable(format!("transfer syntax {uid}"))
	})
}

/// Position of the file meta group, if the input looks like a DICOM file.
fn file_meta_offset(bytes: &[u8]) -> Option<usize> {
	if bytes.get(PREAMBLE_LENGTH..PREAMBLE_LENGTH + MAGIC_CODE.len()) == Some(MAGIC_CODE) {
		Some(PREAMBLE_LENGTH)
	} else if bytes.starts_with(MAGIC_CODE) {
		Some(0)
	} else {
		None
	}
}

/// In explicit VR encoding, bytes 4..6 of the first element hold its value representation.
fn has_explicit_vr(bytes: &[u8]) -> bool {
	bytes
		.get(4..6)
		.is_some_and(|vr| vr.iter().all(u8::is_ascii_uppercase))
}

fn text_or(object: &InMemDicomObject, tag: Tag, fallback: &str) -> String {
	object
		.get(tag)
		.and_then(|element| element.to_str().ok())
		.filter(|value| !value.is_empty())
		.map_or_else(|| fallback.to_owned(), Cow::into_owned)
}

/// A decoded DICOM data set.
pub struct Dataset(DefaultDicomObject);

impl Dataset {
	/// Textual value of an attribute, if present and convertible.
	///
	/// Values are padded to an even length; only that single padding character is removed,
	/// other leading or trailing whitespace is kept.
	pub fn text(&self, tag: Tag) -> Option<String> {
		let raw = self.0.get(tag)?.to_raw_str().ok()?;
		Some(strip_padding(&raw).to_owned())
	}

	pub fn integer(&self, tag: Tag) -> Option<u32> {
		self.0.get(tag)?.to_int::<u32>().ok()
	}

	pub fn has_pixel_data(&self) -> bool {
		self.0.get(tags::PIXEL_DATA).is_some()
	}

	pub fn transfer_syntax(&self) -> &str {
		self.0.meta().transfer_syntax()
	}

	/// Whether the pixel data of this data set can be decoded with the codecs in this build.
	pub fn can_decode_pixel_data(&self) -> bool {
		REGISTRY
			.get(self.transfer_syntax())
			.is_some_and(TransferSyntax::can_decode_all)
	}

	/// Retrieves the stored pixel samples without applying any modality or VOI transform.
	///
	/// Single-frame data yields a rows x columns buffer, multi-frame data a
	/// frames x rows x columns buffer. Of multi-sample pixels, only the first sample is kept.
	pub fn pixels(&self) -> Result<PixelBuffer, DecodeError> {
		let decoded = self.0.decode_pixel_data()?;
		let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
		let samples = decoded.to_ndarray_with_options::<f32>(&options)?.into_dyn();

		// frames x rows x columns x samples per pixel
		let shape = samples.shape().to_vec();
		if shape.len() != 4 || shape[0] == 0 || shape[3] == 0 {
			return Err(DecodeError::PixelShape(shape));
		}

		let samples = samples.index_axis_move(Axis(3), 0);
		let samples = if shape[0] == 1 {
			samples.index_axis_move(Axis(0), 0)
		} else {
			samples
		};
		Ok(PixelBuffer(samples))
	}
}

fn strip_padding(value: &str) -> &str {
	value.strip_suffix([' ', '\0']).unwrap_or(value)
}

/// Pixel samples of one data set, either 2-D or 3-D with frames along the leading axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer(ArrayD<f32>);

impl PixelBuffer {
	pub fn shape(&self) -> &[usize] {
		self.0.shape()
	}

	/// The first plane along the leading axis, or the whole buffer if it is 2-D.
	pub fn first_plane(&self) -> Result<ArrayView2<'_, f32>, DecodeError> {
		let plane = match self.0.ndim() {
			2 => self.0.view(),
			3 if self.0.len_of(Axis(0)) > 0 => self.0.index_axis(Axis(0), 0),
			_ => return Err(DecodeError::PixelShape(self.shape().to_vec())),
		};

		plane
			.into_dimensionality::<Ix2>()
			.map_err(|_| DecodeError::PixelShape(self.shape().to_vec()))
	}
}

#[cfg(test)]
impl<D: dicom_pixeldata::ndarray::Dimension> From<dicom_pixeldata::ndarray::Array<f32, D>>
	for PixelBuffer
{
	fn from(samples: dicom_pixeldata::ndarray::Array<f32, D>) -> Self {
		Self(samples.into_dyn())
	}
}
