//! In-memory DICOM fixtures for unit tests.

use bytes::Bytes;
use dicom::core::value::PixelFragmentSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::dicom_value;
use dicom::dictionary_std::{tags, uids};
use dicom::encoding::transfer_syntax::TransferSyntaxIndex;
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom::transfer_syntax::TransferSyntaxRegistry;

pub const SOP_INSTANCE_UID: &str = "2.25.302207414591231853925480937196862937129";

pub fn element(tag: Tag, vr: VR, value: impl Into<PrimitiveValue>) -> InMemElement {
	DataElement::new(tag, vr, value.into())
}

/// Attributes of the scenario upload: a few patient/study tags and no pixel data.
pub fn study_elements() -> Vec<InMemElement> {
	vec![
		element(tags::PATIENT_ID, VR::LO, "ABC123"),
		element(tags::STUDY_DATE, VR::DA, "20250101"),
		element(tags::MODALITY, VR::CS, "US"),
	]
}

/// A MONOCHROME2 image with 16 bits allocated. `samples` holds all frames, row-major.
pub fn image_elements(rows: u16, columns: u16, frames: u32, samples: &[u16]) -> Vec<InMemElement> {
	let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
	let mut elements = image_module(rows, columns, frames, 16);
	elements.push(element(
		tags::PIXEL_DATA,
		VR::OW,
		PrimitiveValue::U8(bytes.into()),
	));
	elements
}

/// A MONOCHROME2 image with 8 bits allocated.
pub fn image_elements_8bit(rows: u16, columns: u16, samples: &[u8]) -> Vec<InMemElement> {
	let mut elements = image_module(rows, columns, 1, 8);
	elements.push(element(
		tags::PIXEL_DATA,
		VR::OB,
		PrimitiveValue::U8(samples.to_vec().into()),
	));
	elements
}

/// A MONOCHROME2 image whose pixel data is a single encapsulated fragment.
pub fn encapsulated_image_elements(rows: u16, columns: u16, fragment: &[u8]) -> Vec<InMemElement> {
	let mut elements = image_module(rows, columns, 1, 8);
	elements.push(DataElement::new(
		tags::PIXEL_DATA,
		VR::OB,
		PixelFragmentSequence::new(Vec::<u32>::new(), vec![fragment.to_vec()]),
	));
	elements
}

fn image_module(rows: u16, columns: u16, frames: u32, bits: u16) -> Vec<InMemElement> {
	vec![
		element(tags::SAMPLES_PER_PIXEL, VR::US, dicom_value!(U16, [1])),
		element(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"),
		element(tags::NUMBER_OF_FRAMES, VR::IS, frames.to_string()),
		element(tags::ROWS, VR::US, dicom_value!(U16, [rows])),
		element(tags::COLUMNS, VR::US, dicom_value!(U16, [columns])),
		element(tags::BITS_ALLOCATED, VR::US, dicom_value!(U16, [bits])),
		element(tags::BITS_STORED, VR::US, dicom_value!(U16, [bits])),
		element(tags::HIGH_BIT, VR::US, dicom_value!(U16, [bits - 1])),
		element(tags::PIXEL_REPRESENTATION, VR::US, dicom_value!(U16, [0])),
	]
}

/// Encodes the elements as a DICOM file (preamble, file meta group, Explicit VR Little Endian).
pub fn file_bytes(elements: impl IntoIterator<Item = InMemElement>) -> Bytes {
	file_bytes_with_ts(elements, uids::EXPLICIT_VR_LITTLE_ENDIAN)
}

/// Encodes the elements as a DICOM file whose file meta group declares `ts_uid`.
pub fn file_bytes_with_ts(elements: impl IntoIterator<Item = InMemElement>, ts_uid: &str) -> Bytes {
	let file = InMemDicomObject::from_element_iter(elements)
		.with_meta(
			FileMetaTableBuilder::new()
				.transfer_syntax(ts_uid)
				.media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
				.media_storage_sop_instance_uid(SOP_INSTANCE_UID),
		)
		.unwrap();

	let mut buffer = Vec::new();
	file.write_all(&mut buffer).unwrap();
	Bytes::from(buffer)
}

/// Encodes the elements as a bare data set without preamble or file meta group.
pub fn dataset_bytes(elements: impl IntoIterator<Item = InMemElement>, ts_uid: &str) -> Bytes {
	let ts = TransferSyntaxRegistry.get(ts_uid).unwrap();
	let mut buffer = Vec::new();
	InMemDicomObject::from_element_iter(elements)
		.write_dataset_with_ts(&mut buffer, ts)
		.unwrap();
	Bytes::from(buffer)
}

/// A `rows` x `columns` ramp whose samples increase linearly from 0 to `max`.
pub fn ramp(rows: u16, columns: u16, max: u16) -> Vec<u16> {
	let count = usize::from(rows) * usize::from(columns);
	(0..count)
		.map(|i| u16::try_from(i * usize::from(max) / (count - 1)).unwrap())
		.collect()
}
