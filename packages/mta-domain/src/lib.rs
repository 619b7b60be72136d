pub mod article;
pub mod model;
pub mod rfc3339;

pub use model::{
	AnsweredQuery, ChunkMetadata, Citation, Document, IndexedChunk, RetrievedPassage,
	ScoredChunk,
};
