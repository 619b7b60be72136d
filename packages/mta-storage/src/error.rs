#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Chunk {chunk_id} has {actual} dimensions; the collection expects {expected}.")]
	DimensionMismatch { chunk_id: String, expected: u32, actual: usize },
	#[error("Chunk {chunk_id} has an unformattable published_at timestamp.")]
	Timestamp { chunk_id: String },
	#[error("Qdrant request failed: {0}")]
	Qdrant(Box<qdrant_client::QdrantError>),
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
