use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;
use serde::Deserialize;
use time::OffsetDateTime;
use unicode_normalization::UnicodeNormalization;

use crate::Document;

const UNKNOWN_SOURCE: &str = "Unknown";
const ID_PREFIX: &str = "doc-";
const ID_HEX_LEN: usize = 32;

static HTML_TAG: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"<[^>]+>").expect("HTML tag pattern must compile."));
static TRUNCATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\[\+\d+ chars\]").expect("Truncation marker pattern must compile.")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCode {
	RejectEmpty,
	RejectTooShort,
	RejectMissingTimestamp,
}

/// An article as delivered by a news API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticle {
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub content: Option<String>,
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub source: Option<RawSource>,
	#[serde(default, alias = "publishedAt", with = "crate::rfc3339::option")]
	pub published_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawSource {
	Name(String),
	Object { name: Option<String> },
}
impl RawSource {
	fn name(&self) -> Option<&str> {
		match self {
			Self::Name(name) => Some(name.as_str()),
			Self::Object { name } => name.as_deref(),
		}
	}
}

#[derive(Debug, Default)]
pub struct NormalizeReport {
	pub documents: Vec<Document>,
	pub rejected: Vec<(usize, RejectCode)>,
	pub duplicates: usize,
}

/// Strips markup and truncation markers, applies NFKC and collapses whitespace.
pub fn clean_text(text: &str) -> String {
	let mut out: String = text.nfkc().collect();

	out = HTML_TAG.replace_all(&out, "").into_owned();
	out = TRUNCATION_MARKER.replace_all(&out, "").into_owned();

	out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn document_id(url: Option<&str>, title: &str, published_at: OffsetDateTime) -> String {
	let mut hasher = blake3::Hasher::new();

	match url.map(str::trim).filter(|url| !url.is_empty()) {
		Some(url) => {
			hasher.update(b"url:");
			hasher.update(url.as_bytes());
		},
		None => {
			hasher.update(b"title:");
			hasher.update(title.as_bytes());
			hasher.update(b"@");
			hasher.update(&published_at.unix_timestamp().to_be_bytes());
		},
	}

	let hex = hasher.finalize().to_hex();

	format!("{ID_PREFIX}{}", &hex.as_str()[..ID_HEX_LEN])
}

pub fn normalize_article(raw: &RawArticle, min_body_chars: u32) -> Result<Document, RejectCode> {
	let title = clean_text(raw.title.as_deref().unwrap_or_default());
	let body = clean_text(
		&[raw.title.as_deref(), raw.description.as_deref(), raw.content.as_deref()]
			.into_iter()
			.flatten()
			.filter(|part| !part.trim().is_empty())
			.collect::<Vec<_>>()
			.join(" "),
	);

	if body.is_empty() {
		return Err(RejectCode::RejectEmpty);
	}
	if (body.chars().count() as u32) < min_body_chars {
		return Err(RejectCode::RejectTooShort);
	}

	let Some(published_at) = raw.published_at else {
		return Err(RejectCode::RejectMissingTimestamp);
	};
	let url = raw.url.as_deref().map(str::trim).filter(|url| !url.is_empty()).map(String::from);
	let source = raw
		.source
		.as_ref()
		.and_then(RawSource::name)
		.map(clean_text)
		.filter(|name| !name.is_empty())
		.unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

	Ok(Document {
		id: document_id(url.as_deref(), &title, published_at),
		title,
		source,
		published_at,
		body,
		url,
	})
}

/// Normalizes a batch, keeping the first document per id.
pub fn normalize_articles(raw: &[RawArticle], min_body_chars: u32) -> NormalizeReport {
	let mut report = NormalizeReport::default();
	let mut seen = HashSet::new();

	for (idx, article) in raw.iter().enumerate() {
		match normalize_article(article, min_body_chars) {
			Ok(document) =>
				if seen.insert(document.id.clone()) {
					report.documents.push(document);
				} else {
					report.duplicates += 1;
				},
			Err(code) => report.rejected.push((idx, code)),
		}
	}

	report
}
