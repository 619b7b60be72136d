use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	pub synthesis: Synthesis,
	#[serde(default)]
	pub chunking: Chunking,
	#[serde(default)]
	pub retry: Retry,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub ingest: Ingest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	/// Upper bound on completion tokens requested from the model.
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retrieval {
	pub top_k: u32,
	/// Share of the fused score taken from the normalized vector score. The keyword score gets
	/// the remainder.
	pub vector_weight: f32,
	/// Candidates requested from the index per returned passage, leaving room for
	/// per-document de-duplication.
	pub overfetch_factor: u32,
	pub index_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Synthesis {
	pub max_context_tokens: u32,
	/// One of `heuristic` or `tokenizer`.
	#[serde(default = "default_estimator")]
	pub estimator: String,
	/// Hugging Face repository for the `tokenizer` estimator. Defaults to the embedding model.
	pub tokenizer_repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chunking {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Retry {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
	pub enabled: bool,
	pub max_entries: u32,
	pub ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ingest {
	pub min_body_chars: u32,
	pub embed_batch_size: u32,
}

impl Default for Retrieval {
	fn default() -> Self {
		Self { top_k: 5, vector_weight: 0.5, overfetch_factor: 3, index_timeout_ms: 10_000 }
	}
}

impl Default for Chunking {
	fn default() -> Self {
		Self { max_tokens: 500, overlap_tokens: 100 }
	}
}

impl Default for Retry {
	fn default() -> Self {
		Self { max_attempts: 3, base_backoff_ms: 200, max_backoff_ms: 2_000 }
	}
}

impl Default for Cache {
	fn default() -> Self {
		Self { enabled: false, max_entries: 256, ttl_seconds: 300 }
	}
}

impl Default for Ingest {
	fn default() -> Self {
		Self { min_body_chars: 100, embed_batch_size: 100 }
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_max_tokens() -> u32 {
	1_000
}

fn default_estimator() -> String {
	"heuristic".to_string()
}
