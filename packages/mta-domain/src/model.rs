use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A normalized news article. `id` is unique across the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
	pub id: String,
	pub title: String,
	/// Publisher name.
	pub source: String,
	#[serde(with = "crate::rfc3339")]
	pub published_at: OffsetDateTime,
	pub body: String,
	pub url: Option<String>,
}
impl Document {
	/// Documents with an empty body never reach the index.
	pub fn is_indexable(&self) -> bool {
		!self.body.trim().is_empty()
	}

	pub fn metadata(&self) -> ChunkMetadata {
		ChunkMetadata {
			title: self.title.clone(),
			source: self.source.clone(),
			published_at: self.published_at,
			url: self.url.clone(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
	pub title: String,
	pub source: String,
	#[serde(with = "crate::rfc3339")]
	pub published_at: OffsetDateTime,
	pub url: Option<String>,
}

/// A document fragment as stored in the hybrid index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
	pub chunk_id: String,
	/// Back-reference to the owning [`Document`].
	pub document_id: String,
	pub chunk_index: u32,
	/// Dimensionality is fixed for the lifetime of an index generation.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub vector: Vec<f32>,
	pub text: String,
	pub metadata: ChunkMetadata,
}

/// A raw hybrid-index candidate. Each signal is absent when the chunk did not match it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
	pub chunk: IndexedChunk,
	pub vector_score: Option<f32>,
	pub keyword_score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
	pub chunk: IndexedChunk,
	/// Cosine-similarity-derived, 0 when the vector signal did not match.
	pub vector_score: f32,
	/// Engine-native lexical score, unbounded, 0 when no keyword overlapped.
	pub keyword_score: f32,
	/// Comparable across passages of the same retrieval.
	pub fused_score: f32,
	/// 1-based position after fusion.
	pub rank: u32,
}
impl RetrievedPassage {
	pub fn document_id(&self) -> &str {
		&self.chunk.document_id
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
	pub document_id: String,
	pub title: String,
	pub source: String,
	#[serde(with = "crate::rfc3339")]
	pub published_at: OffsetDateTime,
	pub url: Option<String>,
	pub relevance_score: f32,
}
impl From<&RetrievedPassage> for Citation {
	fn from(passage: &RetrievedPassage) -> Self {
		let metadata = &passage.chunk.metadata;

		Self {
			document_id: passage.chunk.document_id.clone(),
			title: metadata.title.clone(),
			source: metadata.source.clone(),
			published_at: metadata.published_at,
			url: metadata.url.clone(),
			relevance_score: passage.fused_score,
		}
	}
}

/// The result of one question. Built once and handed to the caller; never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuery {
	pub question: String,
	pub answer_text: String,
	/// First-use order in `answer_text` when markers were found, fused score descending
	/// otherwise.
	pub citations: Vec<Citation>,
	/// Passages returned by retrieval.
	pub passages_considered: u32,
	/// Passages that fit in the generation context.
	pub passages_in_context: u32,
}
impl AnsweredQuery {
	pub fn has_evidence(&self) -> bool {
		!self.citations.is_empty()
	}
}
