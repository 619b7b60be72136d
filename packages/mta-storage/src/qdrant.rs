pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

use std::collections::HashMap;

use qdrant_client::qdrant::{
	CountPointsBuilder, CreateCollectionBuilder, Distance, Document, Modifier, PointStruct,
	Query, QueryBatchPointsBuilder, QueryPointsBuilder, SparseVectorParamsBuilder,
	SparseVectorsConfigBuilder, UpsertPointsBuilder, Vector, VectorParamsBuilder,
	VectorsConfigBuilder,
};

use mta_domain::{IndexedChunk, ScoredChunk};

use crate::{Error, Result, points};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &mta_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection with a dense and a BM25 vector unless it already exists.
	pub async fn ensure_collection(&self) -> Result<bool> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(false);
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(vectors_config)
			.sparse_vectors_config(sparse_vectors_config);

		self.client.create_collection(builder).await?;

		tracing::info!(
			collection = %self.collection,
			vector_dim = self.vector_dim,
			"Collection created."
		);

		Ok(true)
	}

	/// Drops every chunk by deleting and re-creating the collection.
	pub async fn recreate_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			self.client.delete_collection(self.collection.clone()).await?;
		}

		self.ensure_collection().await?;

		Ok(())
	}

	pub async fn upsert_chunks(&self, chunks: &[IndexedChunk]) -> Result<usize> {
		if chunks.is_empty() {
			return Ok(0);
		}

		let mut batch = Vec::with_capacity(chunks.len());

		for chunk in chunks {
			if chunk.vector.len() != self.vector_dim as usize {
				return Err(Error::DimensionMismatch {
					chunk_id: chunk.chunk_id.clone(),
					expected: self.vector_dim,
					actual: chunk.vector.len(),
				});
			}

			let payload = points::chunk_payload(chunk)?;
			let mut vectors = HashMap::new();

			vectors.insert(DENSE_VECTOR_NAME.to_string(), Vector::from(chunk.vector.clone()));
			vectors.insert(
				BM25_VECTOR_NAME.to_string(),
				Vector::from(Document::new(chunk.text.clone(), BM25_MODEL)),
			);
			batch.push(PointStruct::new(chunk.chunk_id.clone(), vectors, payload));
		}

		let upsert = UpsertPointsBuilder::new(self.collection.clone(), batch).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(chunks.len())
	}

	/// Runs the dense and BM25 queries in one batch request so each candidate keeps both of its
	/// independent scores.
	pub async fn hybrid_query(
		&self,
		vector: &[f32],
		keyword_text: &str,
		limit: u64,
	) -> Result<Vec<ScoredChunk>> {
		let dense = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.using(DENSE_VECTOR_NAME)
			.with_payload(true)
			.limit(limit)
			.build();
		let lexical = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(Document::new(keyword_text.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.with_payload(true)
			.limit(limit)
			.build();
		let batch = QueryBatchPointsBuilder::new(self.collection.clone(), vec![dense, lexical]);
		let response = self.client.query_batch(batch).await?;
		let mut results = response.result.into_iter().map(|batch| batch.result);
		let dense_points = results.next().unwrap_or_default();
		let lexical_points = results.next().unwrap_or_default();

		Ok(points::merge_hits(dense_points, lexical_points))
	}

	pub async fn count(&self) -> Result<u64> {
		let response =
			self.client.count(CountPointsBuilder::new(self.collection.clone()).exact(true)).await?;

		Ok(response.result.map(|result| result.count).unwrap_or(0))
	}
}
