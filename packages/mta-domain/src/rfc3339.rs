//! Serde adapters that keep timestamps as RFC 3339 strings on the wire.

use serde::{Deserialize, Deserializer, Serializer};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&format(value).map_err(serde::ser::Error::custom)?)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;

	parse(&raw).map_err(serde::de::Error::custom)
}

fn format(value: &OffsetDateTime) -> Result<String, time::error::Format> {
	value.format(&Rfc3339)
}

fn parse(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
	OffsetDateTime::parse(raw.trim(), &Rfc3339)
}

/// Optional timestamps. Missing, null and blank strings all read as `None`.
pub mod option {
	use serde::{Deserialize, Deserializer, Serializer};
	use time::OffsetDateTime;

	pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let Some(value) = value else {
			return serializer.serialize_none();
		};

		super::serialize(value, serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Option::<String>::deserialize(deserializer)? {
			Some(raw) if !raw.trim().is_empty() =>
				super::parse(&raw).map(Some).map_err(serde::de::Error::custom),
			_ => Ok(None),
		}
	}
}
