use mta_domain::AnsweredQuery;

use crate::{Error, RagService, Result, cache, retrieval};

/// Per-call retrieval and synthesis parameters. Defaults come from configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnswerOptions {
	pub top_k: u32,
	pub vector_weight: f32,
	pub max_context_tokens: u32,
}

impl RagService {
	pub fn default_options(&self) -> AnswerOptions {
		AnswerOptions {
			top_k: self.cfg.retrieval.top_k,
			vector_weight: self.cfg.retrieval.vector_weight,
			max_context_tokens: self.cfg.synthesis.max_context_tokens,
		}
	}

	/// Answers `question` with the configured defaults.
	pub async fn answer(&self, question: &str) -> Result<AnsweredQuery> {
		self.answer_with(question, self.default_options()).await
	}

	pub async fn answer_with(
		&self,
		question: &str,
		options: AnswerOptions,
	) -> Result<AnsweredQuery> {
		retrieval::validate_request(question, options.top_k, options.vector_weight)?;

		if options.max_context_tokens == 0 {
			return Err(Error::InvalidQuery {
				message: "max_context_tokens must be greater than zero.".to_string(),
			});
		}

		let Some(answer_cache) = self.cache.as_ref() else {
			return self.run_pipeline(question, options).await;
		};
		let key = cache::cache_key(
			question,
			options.top_k,
			options.vector_weight,
			options.max_context_tokens,
		);
		let hit = answer_cache.get(&key).await;

		tracing::info!(
			cache_key_prefix = cache::cache_key_prefix(&key),
			hit = hit.is_some(),
			"Answer cache lookup."
		);

		let mut answered = match hit {
			Some(cached) => cached,
			None =>
				answer_cache.get_or_try_insert(key, self.run_pipeline(question, options)).await?,
		};

		// Equivalent questions share an entry; echo the caller's own wording.
		answered.question = question.trim().to_string();

		Ok(answered)
	}

	async fn run_pipeline(&self, question: &str, options: AnswerOptions) -> Result<AnsweredQuery> {
		let passages = self
			.retry
			.run("retrieve", || {
				self.retriever.retrieve(question, options.top_k, options.vector_weight)
			})
			.await?;

		self.retry
			.run("synthesize", || {
				self.synthesizer.synthesize(question, &passages, options.max_context_tokens)
			})
			.await
	}
}
