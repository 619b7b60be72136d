use std::collections::HashMap;

use qdrant_client::{
	Payload,
	qdrant::{PointId, ScoredPoint, Value, point_id::PointIdOptions, value::Kind},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use mta_domain::{ChunkMetadata, IndexedChunk, ScoredChunk};

use crate::{Error, Result};

pub fn chunk_point_id(document_id: &str, chunk_index: u32) -> Uuid {
	Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("mta:chunk:{document_id}#{chunk_index}").as_bytes())
}

pub fn chunk_payload(chunk: &IndexedChunk) -> Result<Payload> {
	let mut payload = Payload::new();
	let published_at = chunk
		.metadata
		.published_at
		.format(&Rfc3339)
		.map_err(|_| Error::Timestamp { chunk_id: chunk.chunk_id.clone() })?;

	payload.insert("chunk_id", chunk.chunk_id.clone());
	payload.insert("document_id", chunk.document_id.clone());
	payload.insert("chunk_index", Value::from(i64::from(chunk.chunk_index)));
	payload.insert("text", chunk.text.clone());
	payload.insert("title", chunk.metadata.title.clone());
	payload.insert("source", chunk.metadata.source.clone());
	payload.insert("published_at", published_at);

	if let Some(url) = chunk.metadata.url.as_ref() {
		payload.insert("url", url.clone());
	}

	Ok(payload)
}

/// Rebuilds a chunk from its stored payload. Vectors are not returned by queries.
pub fn chunk_from_payload(
	point_id: Option<&PointId>,
	payload: &HashMap<String, Value>,
) -> Option<IndexedChunk> {
	let chunk_id =
		payload_string(payload, "chunk_id").or_else(|| point_id.and_then(point_id_text))?;
	let Some(document_id) = payload_string(payload, "document_id") else {
		tracing::warn!(chunk_id = %chunk_id, "Chunk candidate missing document_id.");

		return None;
	};
	let Some(published_at) = payload_rfc3339(payload, "published_at") else {
		tracing::warn!(chunk_id = %chunk_id, "Chunk candidate missing published_at.");

		return None;
	};

	Some(IndexedChunk {
		chunk_index: payload_u32(payload, "chunk_index").unwrap_or(0),
		vector: Vec::new(),
		text: payload_string(payload, "text").unwrap_or_default(),
		metadata: ChunkMetadata {
			title: payload_string(payload, "title").unwrap_or_default(),
			source: payload_string(payload, "source").unwrap_or_default(),
			published_at,
			url: payload_string(payload, "url"),
		},
		chunk_id,
		document_id,
	})
}

/// Joins the dense and lexical result lists on chunk id, keeping dense order first.
pub fn merge_hits(dense: Vec<ScoredPoint>, lexical: Vec<ScoredPoint>) -> Vec<ScoredChunk> {
	let mut out: Vec<ScoredChunk> = Vec::with_capacity(dense.len() + lexical.len());
	let mut by_chunk: HashMap<String, usize> = HashMap::new();

	for (point, is_dense) in
		dense.into_iter().map(|p| (p, true)).chain(lexical.into_iter().map(|p| (p, false)))
	{
		let Some(chunk) = chunk_from_payload(point.id.as_ref(), &point.payload) else {
			continue;
		};

		match by_chunk.get(&chunk.chunk_id) {
			Some(&idx) => {
				let existing = &mut out[idx];
				let slot =
					if is_dense { &mut existing.vector_score } else { &mut existing.keyword_score };

				*slot = Some(slot.map_or(point.score, |score| score.max(point.score)));
			},
			None => {
				by_chunk.insert(chunk.chunk_id.clone(), out.len());
				out.push(ScoredChunk {
					chunk,
					vector_score: is_dense.then_some(point.score),
					keyword_score: (!is_dense).then_some(point.score),
				});
			},
		}
	}

	out
}

fn point_id_text(point_id: &PointId) -> Option<String> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Some(id.clone()),
		Some(PointIdOptions::Num(num)) => Some(num.to_string()),
		None => None,
	}
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn payload_rfc3339(payload: &HashMap<String, Value>, key: &str) -> Option<OffsetDateTime> {
	let text = payload_string(payload, key)?;

	OffsetDateTime::parse(text.as_str(), &Rfc3339).ok()
}

fn payload_u32(payload: &HashMap<String, Value>, key: &str) -> Option<u32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => u32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				u32::try_from(*value as i64).ok()
			} else {
				None
			},
		_ => None,
	}
}
