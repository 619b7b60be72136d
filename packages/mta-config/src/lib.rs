mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Chunking, Config, EmbeddingProviderConfig, Ingest, LlmProviderConfig, Providers, Qdrant,
	Retrieval, Retry, Service, Storage, Synthesis,
};

use std::{fs, path::Path};

pub const ESTIMATOR_HEURISTIC: &str = "heuristic";
pub const ESTIMATOR_TOKENIZER: &str = "tokenizer";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|source| Error::Read { path: path.to_path_buf(), source })?;

	parse(&raw, &path.display().to_string())
}

pub fn from_toml_str(raw: &str) -> Result<Config> {
	parse(raw, "<inline>")
}

fn parse(raw: &str, origin: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|source| Error::Parse { origin: origin.to_string(), source })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Invalid {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Invalid {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Invalid {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Invalid {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, timeout_ms) in [
		("providers.embedding.timeout_ms", cfg.providers.embedding.timeout_ms),
		("providers.generation.timeout_ms", cfg.providers.generation.timeout_ms),
		("retrieval.index_timeout_ms", cfg.retrieval.index_timeout_ms),
	] {
		if timeout_ms == 0 {
			return Err(Error::Invalid {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	let temperature = cfg.providers.generation.temperature;

	if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
		return Err(Error::Invalid {
			message: "providers.generation.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.providers.generation.max_tokens == 0 {
		return Err(Error::Invalid {
			message: "providers.generation.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Invalid {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.retrieval.vector_weight.is_finite() {
		return Err(Error::Invalid {
			message: "retrieval.vector_weight must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.retrieval.vector_weight) {
		return Err(Error::Invalid {
			message: "retrieval.vector_weight must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.retrieval.overfetch_factor == 0 {
		return Err(Error::Invalid {
			message: "retrieval.overfetch_factor must be greater than zero.".to_string(),
		});
	}
	if cfg.synthesis.max_context_tokens == 0 {
		return Err(Error::Invalid {
			message: "synthesis.max_context_tokens must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.synthesis.estimator.as_str(), ESTIMATOR_HEURISTIC | ESTIMATOR_TOKENIZER) {
		return Err(Error::Invalid {
			message: "synthesis.estimator must be one of heuristic or tokenizer.".to_string(),
		});
	}
	if cfg.chunking.max_tokens == 0 {
		return Err(Error::Invalid {
			message: "chunking.max_tokens must be greater than zero.".to_string(),
		});
	}
	if cfg.chunking.overlap_tokens >= cfg.chunking.max_tokens {
		return Err(Error::Invalid {
			message: "chunking.overlap_tokens must be less than chunking.max_tokens.".to_string(),
		});
	}
	if cfg.retry.max_attempts == 0 {
		return Err(Error::Invalid {
			message: "retry.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.retry.base_backoff_ms > cfg.retry.max_backoff_ms {
		return Err(Error::Invalid {
			message: "retry.base_backoff_ms must not exceed retry.max_backoff_ms.".to_string(),
		});
	}
	if cfg.cache.enabled && cfg.cache.max_entries == 0 {
		return Err(Error::Invalid {
			message: "cache.max_entries must be greater than zero when enabled.".to_string(),
		});
	}
	if cfg.ingest.embed_batch_size == 0 {
		return Err(Error::Invalid {
			message: "ingest.embed_batch_size must be greater than zero.".to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("generation", &cfg.providers.generation.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Invalid {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.synthesis.estimator = cfg.synthesis.estimator.trim().to_ascii_lowercase();

	if cfg.synthesis.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false)
	{
		cfg.synthesis.tokenizer_repo = None;
	}
	if cfg.synthesis.estimator == ESTIMATOR_TOKENIZER && cfg.synthesis.tokenizer_repo.is_none() {
		cfg.synthesis.tokenizer_repo = Some(cfg.providers.embedding.model.clone());
	}
}
