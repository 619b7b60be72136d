use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The pipeline stage a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Query,
	Embedding,
	Index,
	Generation,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Query => "query",
			Self::Embedding => "embedding",
			Self::Index => "index",
			Self::Generation => "generation",
		}
	}
}

impl std::fmt::Display for Stage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
	#[error("Invalid query: {message}")]
	InvalidQuery { message: String },
	#[error("Embedding service unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Hybrid index unavailable: {message}")]
	IndexUnavailable { message: String },
	#[error("Generation model unavailable: {message}")]
	GenerationUnavailable { message: String },
	#[error("Generation model refused the request: {message}")]
	GenerationRefused { message: String },
	#[error("Retrieval failed at the {stage} stage: {message}")]
	RetrievalUnavailable { stage: Stage, message: String },
	#[error("Answer synthesis failed: {message}")]
	SynthesisFailed { message: String },
	#[error("Answer refused by content policy: {message}")]
	ContentRefused { message: String },
	/// A deterministic failure at a stage, such as a rejected credential or a vector with the
	/// wrong dimensionality. Repeating the call cannot succeed.
	#[error("The {stage} stage rejected the request: {message}")]
	Rejected { stage: Stage, message: String },
}
impl Error {
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::EmbeddingUnavailable { .. }
			| Self::IndexUnavailable { .. }
			| Self::GenerationUnavailable { .. }
			| Self::RetrievalUnavailable { .. }
			| Self::SynthesisFailed { .. } => true,
			Self::InvalidQuery { .. }
			| Self::GenerationRefused { .. }
			| Self::ContentRefused { .. }
			| Self::Rejected { .. } => false,
		}
	}

	pub fn stage(&self) -> Stage {
		match self {
			Self::InvalidQuery { .. } => Stage::Query,
			Self::EmbeddingUnavailable { .. } => Stage::Embedding,
			Self::IndexUnavailable { .. } => Stage::Index,
			Self::RetrievalUnavailable { stage, .. } | Self::Rejected { stage, .. } => *stage,
			Self::GenerationUnavailable { .. }
			| Self::GenerationRefused { .. }
			| Self::SynthesisFailed { .. }
			| Self::ContentRefused { .. } => Stage::Generation,
		}
	}

	/// Lifts collaborator failures into the terminal retrieval kind.
	pub(crate) fn into_retrieval(self) -> Self {
		match self {
			Self::EmbeddingUnavailable { message } =>
				Self::RetrievalUnavailable { stage: Stage::Embedding, message },
			Self::IndexUnavailable { message } =>
				Self::RetrievalUnavailable { stage: Stage::Index, message },
			other => other,
		}
	}

	/// Lifts collaborator failures into the terminal synthesis kinds.
	pub(crate) fn into_synthesis(self) -> Self {
		match self {
			Self::GenerationRefused { message } => Self::ContentRefused { message },
			Self::GenerationUnavailable { message } => Self::SynthesisFailed { message },
			other => other,
		}
	}
}

impl From<mta_storage::Error> for Error {
	fn from(err: mta_storage::Error) -> Self {
		match err {
			mta_storage::Error::Qdrant(_) => Self::IndexUnavailable { message: err.to_string() },
			_ => Self::Rejected { stage: Stage::Index, message: err.to_string() },
		}
	}
}
