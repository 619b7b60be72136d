use std::{cmp::Ordering, collections::HashMap, sync::Arc, time::Duration};

use mta_config::Config;
use mta_domain::{RetrievedPassage, ScoredChunk};

use crate::{EmbeddingClient, Error, HybridIndex, Result, Stage};

/// Turns a question into ranked passages, one per document.
pub struct Retriever {
	embedding: Arc<dyn EmbeddingClient>,
	index: Arc<dyn HybridIndex>,
	vector_dim: u32,
	overfetch_factor: u32,
	embedding_timeout: Duration,
	index_timeout: Duration,
}
impl Retriever {
	pub fn new(
		cfg: &Config,
		embedding: Arc<dyn EmbeddingClient>,
		index: Arc<dyn HybridIndex>,
	) -> Self {
		Self {
			embedding,
			index,
			vector_dim: cfg.providers.embedding.dimensions,
			overfetch_factor: cfg.retrieval.overfetch_factor.max(1),
			embedding_timeout: Duration::from_millis(cfg.providers.embedding.timeout_ms),
			index_timeout: Duration::from_millis(cfg.retrieval.index_timeout_ms),
		}
	}

	pub async fn retrieve(
		&self,
		question: &str,
		top_k: u32,
		vector_weight: f32,
	) -> Result<Vec<RetrievedPassage>> {
		validate_request(question, top_k, vector_weight)?;

		let question = question.trim();
		let vector = self.embed_question(question).await.map_err(Error::into_retrieval)?;
		let limit = top_k.saturating_mul(self.overfetch_factor);
		let candidates =
			self.query_index(&vector, question, limit).await.map_err(Error::into_retrieval)?;
		let candidate_count = candidates.len();

		if candidates.is_empty() {
			tracing::info!(top_k, "Hybrid index returned no candidates.");

			return Ok(Vec::new());
		}

		let fused = fuse_candidates(candidates, vector_weight);
		let deduped = dedup_by_document(fused);
		let passages = rank_passages(deduped, top_k);

		tracing::info!(
			candidate_count,
			passage_count = passages.len(),
			top_k,
			vector_weight,
			"Retrieval completed."
		);

		Ok(passages)
	}

	async fn embed_question(&self, question: &str) -> Result<Vec<f32>> {
		let texts = [question.to_string()];
		let vectors = tokio::time::timeout(self.embedding_timeout, self.embedding.embed(&texts))
			.await
			.map_err(|_| Error::EmbeddingUnavailable {
				message: format!(
					"Embedding request timed out after {} ms.",
					self.embedding_timeout.as_millis()
				),
			})??;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding response contained no vectors.".to_string(),
			});
		};

		if vector.len() != self.vector_dim as usize {
			return Err(Error::Rejected {
				stage: Stage::Embedding,
				message: format!(
					"Embedding has {} dimensions; the index expects {}.",
					vector.len(),
					self.vector_dim
				),
			});
		}

		Ok(vector)
	}

	async fn query_index(
		&self,
		vector: &[f32],
		keyword_text: &str,
		limit: u32,
	) -> Result<Vec<ScoredChunk>> {
		tokio::time::timeout(self.index_timeout, self.index.query(vector, keyword_text, limit))
			.await
			.map_err(|_| Error::IndexUnavailable {
				message: format!(
					"Hybrid query timed out after {} ms.",
					self.index_timeout.as_millis()
				),
			})?
	}
}

pub fn validate_request(question: &str, top_k: u32, vector_weight: f32) -> Result<()> {
	if question.trim().is_empty() {
		return Err(Error::InvalidQuery { message: "Question must be non-empty.".to_string() });
	}
	if top_k == 0 {
		return Err(Error::InvalidQuery {
			message: "top_k must be greater than zero.".to_string(),
		});
	}
	if !vector_weight.is_finite() || !(0.0..=1.0).contains(&vector_weight) {
		return Err(Error::InvalidQuery {
			message: "vector_weight must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

/// Min-max normalizes each signal over the batch and blends them.
///
/// A missing signal contributes 0. An engine keyword score of 0 means no term overlapped and is
/// treated as missing. When every present value of a signal is equal, each normalizes to 1.
pub fn fuse_candidates(candidates: Vec<ScoredChunk>, vector_weight: f32) -> Vec<RetrievedPassage> {
	let vector_of = |c: &ScoredChunk| c.vector_score.filter(|score| score.is_finite());
	let keyword_of =
		|c: &ScoredChunk| c.keyword_score.filter(|score| score.is_finite() && *score > 0.0);
	let vector_range = MinMax::over(candidates.iter().filter_map(vector_of));
	let keyword_range = MinMax::over(candidates.iter().filter_map(keyword_of));

	candidates
		.into_iter()
		.map(|candidate| {
			let vector = vector_of(&candidate);
			let keyword = keyword_of(&candidate);
			let norm_vector = vector.map(|score| vector_range.normalize(score)).unwrap_or(0.0);
			let norm_keyword = keyword.map(|score| keyword_range.normalize(score)).unwrap_or(0.0);

			RetrievedPassage {
				chunk: candidate.chunk,
				vector_score: vector.unwrap_or(0.0),
				keyword_score: keyword.unwrap_or(0.0),
				fused_score: vector_weight * norm_vector + (1.0 - vector_weight) * norm_keyword,
				rank: 0,
			}
		})
		.collect()
}

/// Keeps the best-ranked passage of each document.
pub fn dedup_by_document(passages: Vec<RetrievedPassage>) -> Vec<RetrievedPassage> {
	let mut best: HashMap<String, RetrievedPassage> = HashMap::new();

	for passage in passages {
		match best.get(passage.document_id()) {
			Some(existing) if cmp_passages(existing, &passage) != Ordering::Greater => {},
			_ => {
				best.insert(passage.document_id().to_string(), passage);
			},
		}
	}

	best.into_values().collect()
}

/// Sorts, truncates to `top_k` and assigns 1-based ranks.
pub fn rank_passages(mut passages: Vec<RetrievedPassage>, top_k: u32) -> Vec<RetrievedPassage> {
	passages.sort_by(cmp_passages);
	passages.truncate(top_k as usize);

	for (idx, passage) in passages.iter_mut().enumerate() {
		passage.rank = idx as u32 + 1;
	}

	passages
}

/// Fused score descending, then vector score descending, then newest first. Chunk id breaks the
/// remaining ties so ordering is total.
pub fn cmp_passages(a: &RetrievedPassage, b: &RetrievedPassage) -> Ordering {
	cmp_f32_desc(a.fused_score, b.fused_score)
		.then_with(|| cmp_f32_desc(a.vector_score, b.vector_score))
		.then_with(|| b.chunk.metadata.published_at.cmp(&a.chunk.metadata.published_at))
		.then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
}

fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

#[derive(Clone, Copy, Debug)]
struct MinMax {
	min: f32,
	max: f32,
}
impl MinMax {
	fn over(values: impl Iterator<Item = f32>) -> Self {
		values.fold(Self { min: f32::INFINITY, max: f32::NEG_INFINITY }, |acc, value| Self {
			min: acc.min.min(value),
			max: acc.max.max(value),
		})
	}

	fn normalize(self, value: f32) -> f32 {
		let range = self.max - self.min;

		if range <= f32::EPSILON {
			return 1.0;
		}

		((value - self.min) / range).clamp(0.0, 1.0)
	}
}

#[cfg(test)]
mod tests {
	use time::{OffsetDateTime, macros::datetime};

	use mta_domain::{ChunkMetadata, IndexedChunk};

	use super::*;

	fn scored(
		chunk_id: &str,
		document_id: &str,
		vector_score: Option<f32>,
		keyword_score: Option<f32>,
		published_at: OffsetDateTime,
	) -> ScoredChunk {
		ScoredChunk {
			chunk: IndexedChunk {
				chunk_id: chunk_id.to_string(),
				document_id: document_id.to_string(),
				chunk_index: 0,
				vector: Vec::new(),
				text: format!("Text of {chunk_id}."),
				metadata: ChunkMetadata {
					title: format!("Title of {document_id}"),
					source: "Bloomberg".to_string(),
					published_at,
					url: None,
				},
			},
			vector_score,
			keyword_score,
		}
	}

	fn passage(chunk_id: &str, document_id: &str, fused_score: f32) -> RetrievedPassage {
		RetrievedPassage {
			chunk: scored(chunk_id, document_id, None, None, datetime!(2024-01-01 00:00:00 UTC))
				.chunk,
			vector_score: 0.0,
			keyword_score: 0.0,
			fused_score,
			rank: 0,
		}
	}

	#[test]
	fn fusion_normalizes_each_signal_over_the_batch() {
		let day = datetime!(2024-03-01 00:00:00 UTC);
		let fused = fuse_candidates(
			vec![
				scored("a", "doc-a", Some(0.9), Some(12.0), day),
				scored("b", "doc-b", Some(0.5), Some(2.0), day),
				scored("c", "doc-c", Some(0.7), None, day),
			],
			0.5,
		);

		assert!((fused[0].fused_score - 1.0).abs() < 1e-6);
		assert!((fused[1].fused_score - 0.0).abs() < 1e-6);
		assert!((fused[2].fused_score - 0.25).abs() < 1e-6);
		assert_eq!(fused[2].keyword_score, 0.0);
	}

	#[test]
	fn zero_keyword_score_counts_as_missing() {
		let day = datetime!(2024-03-01 00:00:00 UTC);
		let fused = fuse_candidates(
			vec![
				scored("a", "doc-a", Some(0.8), Some(0.0), day),
				scored("b", "doc-b", None, Some(4.0), day),
			],
			0.0,
		);

		assert_eq!(fused[0].fused_score, 0.0);
		assert_eq!(fused[1].fused_score, 1.0);
	}

	#[test]
	fn constant_signal_normalizes_to_one() {
		let day = datetime!(2024-03-01 00:00:00 UTC);
		let fused = fuse_candidates(vec![scored("a", "doc-a", Some(0.4), None, day)], 1.0);

		assert_eq!(fused[0].fused_score, 1.0);
	}

	#[test]
	fn dedup_keeps_highest_fused_per_document() {
		let deduped = dedup_by_document(vec![
			passage("c-1", "doc-42", 0.6),
			passage("c-2", "doc-42", 0.8),
			passage("c-3", "doc-7", 0.3),
		]);
		let survivor = deduped
			.iter()
			.find(|p| p.document_id() == "doc-42")
			.expect("doc-42 should survive");

		assert_eq!(deduped.len(), 2);
		assert_eq!(survivor.chunk.chunk_id, "c-2");
	}

	#[test]
	fn ties_break_on_vector_score_then_recency() {
		let older = datetime!(2023-01-01 00:00:00 UTC);
		let newer = datetime!(2024-01-01 00:00:00 UTC);
		let mut passages = fuse_candidates(
			vec![
				scored("old", "doc-old", Some(0.5), None, older),
				scored("new", "doc-new", Some(0.5), None, newer),
			],
			1.0,
		);

		passages.push(RetrievedPassage { vector_score: 0.9, ..passage("hi", "doc-hi", 1.0) });

		let ranked = rank_passages(passages, 3);
		let ids: Vec<_> = ranked.iter().map(|p| p.chunk.chunk_id.as_str()).collect();

		assert_eq!(ids, vec!["hi", "new", "old"]);
		assert_eq!(ranked.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
	}

	#[test]
	fn ranking_truncates_to_top_k() {
		let passages =
			vec![passage("a", "doc-a", 0.2), passage("b", "doc-b", 0.9), passage("c", "doc-c", 0.5)];
		let ranked = rank_passages(passages, 2);

		assert_eq!(ranked.len(), 2);
		assert_eq!(ranked[0].chunk.chunk_id, "b");
		assert_eq!(ranked[1].chunk.chunk_id, "c");
	}

	#[test]
	fn raising_vector_weight_favors_the_vector_leader() {
		let day = datetime!(2024-03-01 00:00:00 UTC);
		let batch = || {
			vec![
				scored("vec", "doc-vec", Some(0.95), Some(1.0), day),
				scored("kw", "doc-kw", Some(0.40), Some(9.0), day),
				scored("mid", "doc-mid", Some(0.60), Some(5.0), day),
			]
		};
		let position = |weight: f32| {
			let ranked = rank_passages(fuse_candidates(batch(), weight), 3);

			ranked.iter().position(|p| p.chunk.chunk_id == "vec").expect("present")
		};
		let mut previous = position(0.0);

		for step in 1..=10 {
			let current = position(step as f32 / 10.0);

			assert!(current <= previous);

			previous = current;
		}

		assert_eq!(previous, 0);
	}

	#[test]
	fn rejects_invalid_requests() {
		assert!(matches!(validate_request("   ", 3, 0.5), Err(Error::InvalidQuery { .. })));
		assert!(matches!(validate_request("rates?", 0, 0.5), Err(Error::InvalidQuery { .. })));
		assert!(matches!(validate_request("rates?", 3, 1.5), Err(Error::InvalidQuery { .. })));
		assert!(matches!(validate_request("rates?", 3, f32::NAN), Err(Error::InvalidQuery { .. })));
		assert!(validate_request("rates?", 3, 0.5).is_ok());
	}
}
