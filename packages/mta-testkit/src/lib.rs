//! Deterministic in-memory collaborators for pipeline tests.

use std::{
	cmp::Ordering as CmpOrdering,
	collections::{HashMap, HashSet, VecDeque},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Map;
use time::OffsetDateTime;

use mta_config::{
	Cache, Chunking, Config, EmbeddingProviderConfig, Ingest, LlmProviderConfig, Providers,
	Qdrant, Retrieval, Retry, Service, Storage, Synthesis,
};
use mta_domain::{ChunkMetadata, Document, IndexedChunk, ScoredChunk};
use mta_service::{
	BoxFuture, Collaborators, EmbeddingClient, Error, GenerationModel, HybridIndex, IndexStats,
	IndexWriter, Prompt, Result,
};

pub const TEST_DIM: u32 = 256;

/// A valid configuration with fast retries and the answer cache disabled.
pub fn test_config() -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "debug".to_string() },
		storage: Storage {
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "market_news_test".to_string(),
				vector_dim: TEST_DIM,
			},
		},
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "fake-embedding".to_string(),
				dimensions: TEST_DIM,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			generation: LlmProviderConfig {
				provider_id: "fake".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "fake-generation".to_string(),
				temperature: 0.0,
				max_tokens: 256,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		retrieval: Retrieval {
			top_k: 3,
			vector_weight: 0.5,
			overfetch_factor: 3,
			index_timeout_ms: 1_000,
		},
		synthesis: Synthesis {
			max_context_tokens: 2_000,
			estimator: mta_config::ESTIMATOR_HEURISTIC.to_string(),
			tokenizer_repo: None,
		},
		chunking: Chunking { max_tokens: 120, overlap_tokens: 20 },
		retry: Retry { max_attempts: 3, base_backoff_ms: 1, max_backoff_ms: 4 },
		cache: Cache { enabled: false, max_entries: 16, ttl_seconds: 60 },
		ingest: Ingest { min_body_chars: 20, embed_batch_size: 4 },
	}
}

pub fn document(id: &str, title: &str, body: &str, published_at: OffsetDateTime) -> Document {
	Document {
		id: id.to_string(),
		title: title.to_string(),
		source: "Reuters".to_string(),
		published_at,
		body: body.to_string(),
		url: Some(format!("https://news.example.com/{id}")),
	}
}

/// A chunk embedded with [`embed_text`], ready for [`FakeIndex`].
pub fn chunk(
	chunk_id: &str,
	document_id: &str,
	text: &str,
	published_at: OffsetDateTime,
) -> IndexedChunk {
	IndexedChunk {
		chunk_id: chunk_id.to_string(),
		document_id: document_id.to_string(),
		chunk_index: 0,
		vector: embed_text(text, TEST_DIM),
		text: text.to_string(),
		metadata: ChunkMetadata {
			title: format!("{document_id} headline"),
			source: "Reuters".to_string(),
			published_at,
			url: None,
		},
	}
}

pub fn scored(
	chunk: IndexedChunk,
	vector_score: Option<f32>,
	keyword_score: Option<f32>,
) -> ScoredChunk {
	ScoredChunk { chunk, vector_score, keyword_score }
}

/// Hashed bag-of-words vector, L2-normalized. Identical text always yields the same vector.
pub fn embed_text(text: &str, dim: u32) -> Vec<f32> {
	let dim = dim.max(1) as usize;
	let mut vector = vec![0.0_f32; dim];

	for term in terms(text) {
		let hash = blake3::hash(term.as_bytes());
		let bytes = hash.as_bytes();
		let slot = u64::from_le_bytes([
			bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
		]) as usize % dim;

		vector[slot] += 1.0;
	}

	let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm > 0.0 {
		vector.iter_mut().for_each(|v| *v /= norm);
	}

	vector
}

fn terms(text: &str) -> Vec<String> {
	text.split(|c: char| !c.is_alphanumeric())
		.filter(|term| !term.is_empty())
		.map(str::to_lowercase)
		.collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
	let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();

	if norm_a == 0.0 || norm_b == 0.0 { 0.0 } else { dot / (norm_a * norm_b) }
}

/// Decrements `remaining` and reports whether this call should fail.
fn take_failure(remaining: &AtomicUsize) -> bool {
	remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
}

pub struct FakeEmbedding {
	dim: u32,
	calls: AtomicUsize,
	failures: AtomicUsize,
}
impl FakeEmbedding {
	pub fn new(dim: u32) -> Self {
		Self { dim, calls: AtomicUsize::new(0), failures: AtomicUsize::new(0) }
	}

	/// The next `n` calls fail with `EmbeddingUnavailable`.
	pub fn fail_next(&self, n: usize) {
		self.failures.store(n, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl EmbeddingClient for FakeEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let result = if take_failure(&self.failures) {
			Err(Error::EmbeddingUnavailable { message: "Scripted embedding failure.".to_string() })
		} else {
			Ok(texts.iter().map(|text| embed_text(text, self.dim)).collect())
		};

		Box::pin(async move { result })
	}
}

/// In-memory hybrid index: cosine similarity for the dense signal and distinct query-term
/// overlap for the keyword signal.
#[derive(Default)]
pub struct FakeIndex {
	chunks: Mutex<Vec<IndexedChunk>>,
	candidates: Mutex<Option<Vec<ScoredChunk>>>,
	calls: AtomicUsize,
	failures: AtomicUsize,
}
impl FakeIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_chunks(chunks: Vec<IndexedChunk>) -> Self {
		let index = Self::new();

		*index.chunks.lock().unwrap_or_else(|err| err.into_inner()) = chunks;

		index
	}

	/// Every query returns exactly `candidates`, regardless of its inputs.
	pub fn with_candidates(candidates: Vec<ScoredChunk>) -> Self {
		let index = Self::new();

		*index.candidates.lock().unwrap_or_else(|err| err.into_inner()) = Some(candidates);

		index
	}

	/// The next `n` queries fail with `IndexUnavailable`.
	pub fn fail_next(&self, n: usize) {
		self.failures.store(n, Ordering::SeqCst);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn stored(&self) -> Vec<IndexedChunk> {
		self.chunks.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn search(&self, vector: &[f32], keyword_text: &str, limit: usize) -> Vec<ScoredChunk> {
		let chunks = self.chunks.lock().unwrap_or_else(|err| err.into_inner());
		let query_terms: HashSet<String> = terms(keyword_text).into_iter().collect();
		let mut dense: Vec<(usize, f32)> = chunks
			.iter()
			.enumerate()
			.filter(|(_, chunk)| !chunk.vector.is_empty())
			.map(|(idx, chunk)| (idx, cosine(vector, &chunk.vector)))
			.collect();
		let mut lexical: Vec<(usize, f32)> = chunks
			.iter()
			.enumerate()
			.map(|(idx, chunk)| {
				let chunk_terms: HashSet<String> = terms(&chunk.text).into_iter().collect();

				(idx, query_terms.intersection(&chunk_terms).count() as f32)
			})
			.filter(|(_, score)| *score > 0.0)
			.collect();

		for list in [&mut dense, &mut lexical] {
			list.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));
			list.truncate(limit);
		}

		let mut merged: Vec<ScoredChunk> = Vec::new();
		let mut positions: HashMap<usize, usize> = HashMap::new();

		for (idx, score) in dense {
			positions.insert(idx, merged.len());
			merged.push(ScoredChunk {
				chunk: chunks[idx].clone(),
				vector_score: Some(score),
				keyword_score: None,
			});
		}
		for (idx, score) in lexical {
			match positions.get(&idx) {
				Some(&pos) => merged[pos].keyword_score = Some(score),
				None => merged.push(ScoredChunk {
					chunk: chunks[idx].clone(),
					vector_score: None,
					keyword_score: Some(score),
				}),
			}
		}

		merged
	}
}
impl HybridIndex for FakeIndex {
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		keyword_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ScoredChunk>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let result = if take_failure(&self.failures) {
			Err(Error::IndexUnavailable { message: "Scripted index failure.".to_string() })
		} else if let Some(candidates) =
			self.candidates.lock().unwrap_or_else(|err| err.into_inner()).clone()
		{
			Ok(candidates)
		} else {
			Ok(self.search(vector, keyword_text, limit as usize))
		};

		Box::pin(async move { result })
	}
}
impl IndexWriter for FakeIndex {
	fn upsert<'a>(&'a self, chunks: &'a [IndexedChunk]) -> BoxFuture<'a, Result<usize>> {
		let mut stored = self.chunks.lock().unwrap_or_else(|err| err.into_inner());

		for chunk in chunks {
			match stored.iter_mut().find(|existing| existing.chunk_id == chunk.chunk_id) {
				Some(existing) => *existing = chunk.clone(),
				None => stored.push(chunk.clone()),
			}
		}

		let written = chunks.len();

		Box::pin(async move { Ok(written) })
	}

	fn stats(&self) -> BoxFuture<'_, Result<IndexStats>> {
		let chunks = self.chunks.lock().unwrap_or_else(|err| err.into_inner()).len() as u64;

		Box::pin(async move { Ok(IndexStats { chunks }) })
	}
}

/// Replies from a script, then with a fixed default answer. Records every prompt it receives.
pub struct FakeGeneration {
	default_reply: String,
	script: Mutex<VecDeque<Result<String>>>,
	prompts: Mutex<Vec<Prompt>>,
	calls: AtomicUsize,
}
impl FakeGeneration {
	pub fn replying(reply: &str) -> Self {
		Self {
			default_reply: reply.to_string(),
			script: Mutex::new(VecDeque::new()),
			prompts: Mutex::new(Vec::new()),
			calls: AtomicUsize::new(0),
		}
	}

	/// Queues a one-off result served before the default reply.
	pub fn push(&self, result: Result<String>) {
		self.script.lock().unwrap_or_else(|err| err.into_inner()).push_back(result);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn prompts(&self) -> Vec<Prompt> {
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl GenerationModel for FakeGeneration {
	fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.prompts.lock().unwrap_or_else(|err| err.into_inner()).push(prompt.clone());

		let scripted = self.script.lock().unwrap_or_else(|err| err.into_inner()).pop_front();
		let result = scripted.unwrap_or_else(|| Ok(self.default_reply.clone()));

		Box::pin(async move { result })
	}
}

/// Sleeps for `delay` before delegating every call, to exercise per-call timeouts.
pub struct Delayed<T> {
	inner: Arc<T>,
	delay: Duration,
}
impl<T> Delayed<T> {
	pub fn new(inner: Arc<T>, delay: Duration) -> Self {
		Self { inner, delay }
	}
}
impl<T> EmbeddingClient for Delayed<T>
where
	T: EmbeddingClient,
{
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			self.inner.embed(texts).await
		})
	}
}
impl<T> HybridIndex for Delayed<T>
where
	T: HybridIndex,
{
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		keyword_text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<ScoredChunk>>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			self.inner.query(vector, keyword_text, limit).await
		})
	}
}
impl<T> GenerationModel for Delayed<T>
where
	T: GenerationModel,
{
	fn generate<'a>(&'a self, prompt: &'a Prompt) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			tokio::time::sleep(self.delay).await;

			self.inner.generate(prompt).await
		})
	}
}

pub fn collaborators(
	embedding: Arc<FakeEmbedding>,
	index: Arc<FakeIndex>,
	generation: Arc<FakeGeneration>,
) -> Collaborators {
	Collaborators { embedding, index, generation }
}
