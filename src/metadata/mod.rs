use crate::decoding::{Dataset, DecodeMode, DicomDecoder};
use crate::error::ProcessingError;
use bytes::Bytes;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};
use tracing::{instrument, trace};

/// The attributes that are safe to expose to clients.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKey {
	PatientId,
	PatientName,
	StudyDate,
	Modality,
	Rows,
	Columns,
}

impl MetadataKey {
	/// All keys in output order.
	pub const ALL: [Self; 6] = [
		Self::PatientId,
		Self::PatientName,
		Self::StudyDate,
		Self::Modality,
		Self::Rows,
		Self::Columns,
	];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::PatientId => "PatientID",
			Self::PatientName => "PatientName",
			Self::StudyDate => "StudyDate",
			Self::Modality => "Modality",
			Self::Rows => "Rows",
			Self::Columns => "Columns",
		}
	}

	pub const fn tag(self) -> Tag {
		match self {
			Self::PatientId => tags::PATIENT_ID,
			Self::PatientName => tags::PATIENT_NAME,
			Self::StudyDate => tags::STUDY_DATE,
			Self::Modality => tags::MODALITY,
			Self::Rows => tags::ROWS,
			Self::Columns => tags::COLUMNS,
		}
	}

	const fn is_integer(self) -> bool {
		matches!(self, Self::Rows | Self::Columns)
	}
}

impl Display for MetadataKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.as_str())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
	Text(String),
	Integer(u32),
}

/// Present values of the [`MetadataKey`]s, in the order of [`MetadataKey::ALL`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(Vec<(MetadataKey, MetadataValue)>);

#[cfg(test)]
impl Metadata {
	pub fn get(&self, key: MetadataKey) -> Option<&MetadataValue> {
		self.0
			.iter()
			.find_map(|(k, value)| (*k == key).then_some(value))
	}

	pub fn keys(&self) -> impl Iterator<Item = MetadataKey> + '_ {
		self.0.iter().map(|(key, _)| *key)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl Serialize for Metadata {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut map = serializer.serialize_map(Some(self.0.len()))?;
		for (key, value) in &self.0 {
			map.serialize_entry(key.as_str(), value)?;
		}
		map.end()
	}
}

/// Decodes the upload leniently and projects the known attributes.
#[instrument(skip_all)]
pub fn extract_metadata(decoder: &DicomDecoder, bytes: &Bytes) -> Result<Metadata, ProcessingError> {
	let dataset = decoder.decode(bytes, DecodeMode::Lenient)?;
	Ok(project(&dataset))
}

/// Collects the [`MetadataKey`]s present in the data set. Absent and empty values are skipped.
pub fn project(dataset: &Dataset) -> Metadata {
	let entries = MetadataKey::ALL
		.into_iter()
		.filter_map(|key| {
			let value = if key.is_integer() {
				dataset.integer(key.tag()).map(MetadataValue::Integer)
			} else {
				dataset
					.text(key.tag())
					.filter(|text| !text.is_empty())
					.map(MetadataValue::Text)
			};
			if value.is_none() {
				trace!(%key, "Attribute absent");
			}
			value.map(|value| (key, value))
		})
		.collect();

	Metadata(entries)
}
