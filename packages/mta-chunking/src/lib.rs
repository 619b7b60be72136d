pub use tokenizers::Tokenizer;
use unicode_segmentation::UnicodeSegmentation;

pub type TokenizerError = tokenizers::Error;

/// Counts how many model tokens a piece of text is expected to occupy.
pub trait TokenEstimator
where
	Self: Send + Sync,
{
	fn estimate(&self, text: &str) -> usize;
}

/// Word-count heuristic: one token is roughly three quarters of a word.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicEstimator;
impl TokenEstimator for HeuristicEstimator {
	fn estimate(&self, text: &str) -> usize {
		let words = text.unicode_words().count();

		(words * 4).div_ceil(3)
	}
}

pub struct TokenizerEstimator {
	tokenizer: Tokenizer,
}
impl TokenizerEstimator {
	pub fn new(tokenizer: Tokenizer) -> Self {
		Self { tokenizer }
	}

	pub fn from_pretrained(repo: &str) -> Result<Self, TokenizerError> {
		load_tokenizer(repo).map(Self::new)
	}
}
impl TokenEstimator for TokenizerEstimator {
	fn estimate(&self, text: &str) -> usize {
		match self.tokenizer.encode(text, false) {
			Ok(encoding) => encoding.len(),
			Err(err) => {
				tracing::error!(error = %err, "Tokenizer failed to encode text; using heuristic.");

				HeuristicEstimator.estimate(text)
			},
		}
	}
}

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_tokens: u32,
	pub overlap_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct Chunk {
	pub chunk_index: u32,
	pub start_offset: usize,
	pub end_offset: usize,
	pub text: String,
}

pub fn load_tokenizer(repo: &str) -> Result<Tokenizer, TokenizerError> {
	Tokenizer::from_pretrained(repo, None)
}

pub fn split_text(text: &str, cfg: &ChunkingConfig, estimator: &dyn TokenEstimator) -> Vec<Chunk> {
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_start = 0_usize;
	let mut last_end = 0_usize;
	let mut chunk_index = 0_u32;

	for (idx, segment) in segments(text, cfg, estimator) {
		let candidate = format!("{current}{segment}");
		let token_count = estimator.estimate(candidate.trim());

		if token_count as u32 > cfg.max_tokens && !current.trim().is_empty() {
			chunks.push(Chunk {
				chunk_index,
				start_offset: current_start,
				end_offset: last_end,
				text: current.trim().to_string(),
			});

			chunk_index += 1;

			let overlap = overlap_tail(&current, cfg.overlap_tokens, estimator);
			let overlap_fits =
				estimator.estimate(format!("{overlap}{segment}").trim()) as u32 <= cfg.max_tokens;

			current = if overlap_fits { overlap.to_string() } else { String::new() };
			current_start = last_end.saturating_sub(current.len());
		}
		if current.is_empty() {
			current_start = idx;
		}

		current.push_str(segment);

		last_end = idx + segment.len();
	}

	if !current.trim().is_empty() {
		chunks.push(Chunk {
			chunk_index,
			start_offset: current_start,
			end_offset: last_end,
			text: current.trim().to_string(),
		});
	}

	chunks
}

// Sentences, with any sentence longer than a whole chunk broken down to word boundaries.
fn segments<'a>(
	text: &'a str,
	cfg: &ChunkingConfig,
	estimator: &dyn TokenEstimator,
) -> Vec<(usize, &'a str)> {
	let mut out = Vec::new();

	for (idx, sentence) in text.split_sentence_bound_indices() {
		if estimator.estimate(sentence) as u32 <= cfg.max_tokens {
			out.push((idx, sentence));

			continue;
		}

		for (word_idx, word) in sentence.split_word_bound_indices() {
			out.push((idx + word_idx, word));
		}
	}

	out
}

// Longest suffix of `text`, cut at a word boundary, that fits in `overlap_tokens`.
fn overlap_tail<'a>(text: &'a str, overlap_tokens: u32, estimator: &dyn TokenEstimator) -> &'a str {
	if overlap_tokens == 0 {
		return "";
	}

	let mut tail = "";

	for (idx, _) in text.split_word_bound_indices().rev() {
		let candidate = &text[idx..];

		if estimator.estimate(candidate) as u32 > overlap_tokens {
			break;
		}

		tail = candidate;
	}

	tail
}
