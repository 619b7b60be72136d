use std::{sync::Arc, time::Duration};

use serde::Serialize;

use mta_chunking::{ChunkingConfig, TokenEstimator};
use mta_config::Config;
use mta_domain::{Document, IndexedChunk};
use mta_storage::points;

use crate::{EmbeddingClient, Error, IndexWriter, Result, Stage, retry::RetryPolicy};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
	/// Documents that produced at least one chunk.
	pub documents: usize,
	pub chunks: usize,
	/// Documents skipped for having no indexable text.
	pub rejected: usize,
}

/// Chunks, embeds and upserts documents into the hybrid index.
pub struct Indexer {
	embedding: Arc<dyn EmbeddingClient>,
	writer: Arc<dyn IndexWriter>,
	estimator: Arc<dyn TokenEstimator>,
	chunking: ChunkingConfig,
	batch_size: usize,
	vector_dim: u32,
	embedding_timeout: Duration,
	retry: RetryPolicy,
}
impl Indexer {
	pub fn new(
		cfg: &Config,
		embedding: Arc<dyn EmbeddingClient>,
		writer: Arc<dyn IndexWriter>,
		estimator: Arc<dyn TokenEstimator>,
	) -> Self {
		Self {
			embedding,
			writer,
			estimator,
			chunking: ChunkingConfig {
				max_tokens: cfg.chunking.max_tokens,
				overlap_tokens: cfg.chunking.overlap_tokens,
			},
			batch_size: (cfg.ingest.embed_batch_size as usize).max(1),
			vector_dim: cfg.providers.embedding.dimensions,
			embedding_timeout: Duration::from_millis(cfg.providers.embedding.timeout_ms),
			retry: RetryPolicy::from_config(&cfg.retry),
		}
	}

	pub async fn index_documents(&self, documents: &[Document]) -> Result<IndexReport> {
		let mut report = IndexReport::default();
		let mut pending = Vec::new();

		for document in documents {
			let chunks = self.chunk_document(document);

			if chunks.is_empty() {
				tracing::warn!(document_id = %document.id, "Document has no indexable text.");

				report.rejected += 1;

				continue;
			}

			report.documents += 1;

			pending.extend(chunks);
		}

		for batch in pending.chunks_mut(self.batch_size) {
			let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
			let vectors = self.retry.run("embed_chunks", || self.embed_batch(&texts)).await?;

			for (chunk, vector) in batch.iter_mut().zip(vectors) {
				chunk.vector = vector;
			}

			let batch = &*batch;
			let written = self.retry.run("upsert_chunks", || self.writer.upsert(batch)).await?;

			report.chunks += written;

			tracing::info!(
				batch_size = batch.len(),
				total_chunks = report.chunks,
				"Chunk batch indexed."
			);
		}

		tracing::info!(
			documents = report.documents,
			chunks = report.chunks,
			rejected = report.rejected,
			"Indexing completed."
		);

		Ok(report)
	}

	fn chunk_document(&self, document: &Document) -> Vec<IndexedChunk> {
		if !document.is_indexable() {
			return Vec::new();
		}

		let metadata = document.metadata();

		mta_chunking::split_text(&document.body, &self.chunking, self.estimator.as_ref())
			.into_iter()
			.filter(|chunk| !chunk.text.trim().is_empty())
			.map(|chunk| IndexedChunk {
				chunk_id: points::chunk_point_id(&document.id, chunk.chunk_index).to_string(),
				document_id: document.id.clone(),
				chunk_index: chunk.chunk_index,
				vector: Vec::new(),
				text: chunk.text,
				metadata: metadata.clone(),
			})
			.collect()
	}

	async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
		let vectors = tokio::time::timeout(self.embedding_timeout, self.embedding.embed(texts))
			.await
			.map_err(|_| Error::EmbeddingUnavailable {
				message: format!(
					"Embedding request timed out after {} ms.",
					self.embedding_timeout.as_millis()
				),
			})??;

		if vectors.len() != texts.len() {
			return Err(Error::EmbeddingUnavailable {
				message: format!(
					"Embedding response has {} vectors for {} texts.",
					vectors.len(),
					texts.len()
				),
			});
		}
		if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.vector_dim as usize) {
			return Err(Error::Rejected {
				stage: Stage::Embedding,
				message: format!(
					"Embedding has {} dimensions; the index expects {}.",
					bad.len(),
					self.vector_dim
				),
			});
		}

		Ok(vectors)
	}
}
