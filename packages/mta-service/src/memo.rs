use std::sync::Arc;

use moka::sync::Cache;

use crate::{BoxFuture, EmbeddingClient, Error, Result};

/// Caches embeddings per text in front of another client.
///
/// Only texts missing from the cache are forwarded, in one call. Capacity is bounded by
/// `max_entries`.
pub struct MemoizedEmbedding {
	inner: Arc<dyn EmbeddingClient>,
	vectors: Cache<String, Vec<f32>>,
}
impl MemoizedEmbedding {
	pub fn new(inner: Arc<dyn EmbeddingClient>, max_entries: u64) -> Self {
		Self { inner, vectors: Cache::builder().max_capacity(max_entries).build() }
	}

	pub fn cached(&self, text: &str) -> Option<Vec<f32>> {
		self.vectors.get(text)
	}
}
impl EmbeddingClient for MemoizedEmbedding {
	fn embed<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let mut out: Vec<Option<Vec<f32>>> =
				texts.iter().map(|text| self.vectors.get(text)).collect();
			let missing: Vec<usize> =
				out.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(idx, _)| idx).collect();

			if !missing.is_empty() {
				let pending: Vec<String> = missing.iter().map(|&idx| texts[idx].clone()).collect();
				let fresh = self.inner.embed(&pending).await?;

				if fresh.len() != pending.len() {
					return Err(Error::EmbeddingUnavailable {
						message: format!(
							"Embedding response has {} vectors for {} texts.",
							fresh.len(),
							pending.len()
						),
					});
				}

				for (idx, vector) in missing.into_iter().zip(fresh) {
					self.vectors.insert(texts[idx].clone(), vector.clone());

					out[idx] = Some(vector);
				}
			}

			tracing::debug!(text_count = texts.len(), "Embeddings resolved through memo.");

			Ok(out.into_iter().flatten().collect())
		})
	}
}
