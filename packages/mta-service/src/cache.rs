use std::{future::Future, sync::Arc, time::Duration};

use moka::future::Cache;

use mta_domain::AnsweredQuery;

use crate::{Error, Result};

/// Read-through answer cache with a bounded entry count and a time-to-live.
///
/// Concurrent lookups of the same key share one in-flight computation. A failed computation is
/// not stored, so the next caller runs the pipeline again.
pub struct AnswerCache {
	answers: Cache<String, AnsweredQuery>,
}
impl AnswerCache {
	pub fn new(max_entries: u64, ttl: Duration) -> Self {
		let answers = Cache::builder().max_capacity(max_entries).time_to_live(ttl).build();

		Self { answers }
	}

	pub fn from_config(cfg: &mta_config::Cache) -> Self {
		Self::new(u64::from(cfg.max_entries), Duration::from_secs(cfg.ttl_seconds))
	}

	pub async fn get(&self, key: &str) -> Option<AnsweredQuery> {
		self.answers.get(key).await
	}

	pub async fn get_or_try_insert<F>(&self, key: String, init: F) -> Result<AnsweredQuery>
	where
		F: Future<Output = Result<AnsweredQuery>>,
	{
		self.answers.try_get_with(key, init).await.map_err(Arc::unwrap_or_clone)
	}

	pub fn entry_count(&self) -> u64 {
		self.answers.entry_count()
	}
}

/// Trims, lower-cases and collapses whitespace.
pub fn normalize_question(question: &str) -> String {
	question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn cache_key(
	question: &str,
	top_k: u32,
	vector_weight: f32,
	max_context_tokens: u32,
) -> String {
	let mut hasher = blake3::Hasher::new();

	hasher.update(normalize_question(question).as_bytes());
	hasher.update(&top_k.to_le_bytes());
	hasher.update(&vector_weight.to_bits().to_le_bytes());
	hasher.update(&max_context_tokens.to_le_bytes());

	hasher.finalize().to_hex().to_string()
}

pub fn cache_key_prefix(key: &str) -> &str {
	key.get(..12).unwrap_or(key)
}
