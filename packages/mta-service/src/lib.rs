pub mod answer;
pub mod cache;
pub mod ingest;
pub mod memo;
pub mod retrieval;
pub mod retry;
pub mod synthesis;

mod error;

pub use answer::AnswerOptions;
pub use error::{Error, Result, Stage};
pub use ingest::{IndexReport, Indexer};
pub use memo::MemoizedEmbedding;
pub use retrieval::Retriever;
pub use synthesis::{Prompt, Synthesizer};

use std::{future::Future, pin::Pin, sync::Arc};

use serde::Serialize;

use mta_chunking::{HeuristicEstimator, TokenEstimator, TokenizerEstimator};
use mta_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use mta_domain::{IndexedChunk, ScoredChunk};
use mta_providers::{embedding, generation};
use mta_storage::qdrant::QdrantStore;

use crate::{cache::AnswerCache, retry::RetryPolicy};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Maps text to fixed-length vectors. Deterministic for a fixed model version.
pub trait EmbeddingClient
where
	Self: Send + Sync,
{
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

/// Answers combined vector and full-text queries with independent per-signal scores.
pub trait HybridIndex
where
	Self: Send + Sync,
{
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		keyword_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ScoredChunk>>>;
}

pub trait IndexWriter
where
	Self: Send + Sync,
{
	fn upsert<'a>(&'a self, chunks: &'a [IndexedChunk]) -> BoxFuture<'a, Result<usize>>;

	fn stats(&self) -> BoxFuture<'_, Result<IndexStats>>;
}

pub trait GenerationModel
where
	Self: Send + Sync,
{
	fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
	pub chunks: u64,
}

#[derive(Clone)]
pub struct Collaborators {
	pub embedding: Arc<dyn EmbeddingClient>,
	pub index: Arc<dyn HybridIndex>,
	pub generation: Arc<dyn GenerationModel>,
}

pub struct RagService {
	pub cfg: Config,
	pub retriever: Retriever,
	pub synthesizer: Synthesizer,
	pub(crate) retry: RetryPolicy,
	pub(crate) cache: Option<AnswerCache>,
}
impl RagService {
	/// Wires the HTTP providers and the Qdrant store described by `cfg`.
	pub fn new(cfg: Config) -> Result<Self> {
		let store = QdrantStore::new(&cfg.storage.qdrant)?;
		let embedding = MemoizedEmbedding::new(
			Arc::new(HttpEmbedding::new(cfg.providers.embedding.clone())),
			u64::from(cfg.cache.max_entries),
		);
		let collaborators = Collaborators {
			embedding: Arc::new(embedding),
			index: Arc::new(store),
			generation: Arc::new(HttpGeneration::new(cfg.providers.generation.clone())),
		};
		let estimator = build_estimator(&cfg);

		Ok(Self::with_collaborators(cfg, collaborators, estimator))
	}

	pub fn with_collaborators(
		cfg: Config,
		collaborators: Collaborators,
		estimator: Arc<dyn TokenEstimator>,
	) -> Self {
		let retriever = Retriever::new(&cfg, collaborators.embedding, collaborators.index);
		let synthesizer = Synthesizer::new(&cfg, collaborators.generation, estimator);
		let retry = RetryPolicy::from_config(&cfg.retry);
		let cache = cfg.cache.enabled.then(|| AnswerCache::from_config(&cfg.cache));

		Self { cfg, retriever, synthesizer, retry, cache }
	}
}

/// OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedding {
	cfg: EmbeddingProviderConfig,
}
impl HttpEmbedding {
	pub fn new(cfg: EmbeddingProviderConfig) -> Self {
		Self { cfg }
	}
}
impl EmbeddingClient for HttpEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { embedding::embed(&self.cfg, texts).await.map_err(embedding_error) })
	}
}

/// OpenAI-compatible chat-completions endpoint.
pub struct HttpGeneration {
	cfg: LlmProviderConfig,
}
impl HttpGeneration {
	pub fn new(cfg: LlmProviderConfig) -> Self {
		Self { cfg }
	}
}
impl GenerationModel for HttpGeneration {
	fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			let messages = prompt.messages();

			generation::generate(&self.cfg, &messages).await.map_err(generation_error)
		})
	}
}

impl HybridIndex for QdrantStore {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		keyword_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ScoredChunk>>> {
		Box::pin(async move { Ok(self.hybrid_query(vector, keyword_text, limit.into()).await?) })
	}
}

impl IndexWriter for QdrantStore {
	fn upsert<'a>(&'a self, chunks: &'a [IndexedChunk]) -> BoxFuture<'a, Result<usize>> {
		Box::pin(async move { Ok(self.upsert_chunks(chunks).await?) })
	}

	fn stats(&self) -> BoxFuture<'_, Result<IndexStats>> {
		Box::pin(async move { Ok(IndexStats { chunks: self.count().await? }) })
	}
}

fn embedding_error(err: mta_providers::Error) -> Error {
	if err.is_retryable() {
		Error::EmbeddingUnavailable { message: err.to_string() }
	} else {
		Error::Rejected { stage: Stage::Embedding, message: err.to_string() }
	}
}

fn generation_error(err: mta_providers::Error) -> Error {
	if err.is_refusal() {
		Error::GenerationRefused { message: err.to_string() }
	} else if err.is_retryable() {
		Error::GenerationUnavailable { message: err.to_string() }
	} else {
		Error::Rejected { stage: Stage::Generation, message: err.to_string() }
	}
}

/// Picks the context-budget estimator named by `synthesis.estimator`.
///
/// A tokenizer that cannot be loaded degrades to the word heuristic.
pub fn build_estimator(cfg: &Config) -> Arc<dyn TokenEstimator> {
	if cfg.synthesis.estimator != mta_config::ESTIMATOR_TOKENIZER {
		return Arc::new(HeuristicEstimator);
	}

	let repo = cfg.synthesis.tokenizer_repo.as_deref().unwrap_or(&cfg.providers.embedding.model);

	match TokenizerEstimator::from_pretrained(repo) {
		Ok(estimator) => Arc::new(estimator),
		Err(err) => {
			tracing::warn!(
				error = %err,
				tokenizer_repo = repo,
				"Tokenizer load failed; using the heuristic estimator."
			);

			Arc::new(HeuristicEstimator)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn http(status: u16) -> mta_providers::Error {
		mta_providers::Error::Http { status, message: "invalid api key".to_string() }
	}

	#[test]
	fn rejected_provider_calls_name_their_stage() {
		let embedding = embedding_error(http(401));
		let generation = generation_error(http(403));

		assert!(matches!(embedding, Error::Rejected { stage: Stage::Embedding, .. }));
		assert!(matches!(generation, Error::Rejected { stage: Stage::Generation, .. }));
		assert!(!embedding.is_retryable());
		assert!(!generation.is_retryable());
	}

	#[test]
	fn provider_outages_stay_retryable() {
		assert!(matches!(embedding_error(http(503)), Error::EmbeddingUnavailable { .. }));
		assert!(matches!(generation_error(http(502)), Error::GenerationUnavailable { .. }));
		assert!(matches!(
			generation_error(mta_providers::Error::Refused { message: "Flagged.".to_string() }),
			Error::GenerationRefused { .. }
		));
	}
}
