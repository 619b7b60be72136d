pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("Request timed out: {message}")]
	Timeout { message: String },
	#[error("Rate limited by provider: {message}")]
	RateLimited { message: String },
	#[error("Provider refused the request: {message}")]
	Refused { message: String },
	#[error("Provider returned HTTP {status}: {message}")]
	Http { status: u16, message: String },
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	/// Content-policy refusals are terminal; retrying the same prompt yields the same answer.
	pub fn is_refusal(&self) -> bool {
		matches!(self, Self::Refused { .. })
	}

	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Reqwest(_)
			| Self::Timeout { .. }
			| Self::RateLimited { .. }
			| Self::InvalidResponse { .. }
			| Self::SerdeJson(_) => true,
			Self::Http { status, .. } => *status >= 500,
			Self::Refused { .. }
			| Self::InvalidConfig { .. }
			| Self::InvalidHeaderName(_)
			| Self::InvalidHeaderValue(_) => false,
		}
	}
}
