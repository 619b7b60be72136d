use std::{
	collections::HashSet,
	sync::{Arc, LazyLock},
	time::Duration,
};

use regex::Regex;
use serde_json::Value;
use time::{Date, OffsetDateTime};

use mta_chunking::TokenEstimator;
use mta_config::Config;
use mta_domain::{AnsweredQuery, Citation, RetrievedPassage};

use crate::{Error, GenerationModel, Result, retrieval};

pub const NO_EVIDENCE_ANSWER: &str =
	"No relevant information was found in the indexed financial news to answer this question.";

static MARKER_GROUP: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\[\s*([Ss]\s*\d+(?:\s*[,;]\s*[Ss]?\s*\d+)*)\s*\]")
		.expect("Citation marker pattern must compile.")
});
static MARKER_NUMBER: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\d+").expect("Marker number pattern must compile."));

/// A chat prompt as sent to the generation model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
	pub system: String,
	pub user: String,
}
impl Prompt {
	pub fn messages(&self) -> Vec<Value> {
		vec![
			serde_json::json!({ "role": "system", "content": self.system }),
			serde_json::json!({ "role": "user", "content": self.user }),
		]
	}
}

/// Passages that fit the context budget, in rank order. Source `[S<n>]` refers to
/// `passages[n - 1]`.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
	pub passages: Vec<RetrievedPassage>,
	pub text: String,
	pub tokens_used: usize,
}

pub struct Synthesizer {
	generation: Arc<dyn GenerationModel>,
	estimator: Arc<dyn TokenEstimator>,
	timeout: Duration,
}
impl Synthesizer {
	pub fn new(
		cfg: &Config,
		generation: Arc<dyn GenerationModel>,
		estimator: Arc<dyn TokenEstimator>,
	) -> Self {
		Self {
			generation,
			estimator,
			timeout: Duration::from_millis(cfg.providers.generation.timeout_ms),
		}
	}

	pub async fn synthesize(
		&self,
		question: &str,
		passages: &[RetrievedPassage],
		max_context_tokens: u32,
	) -> Result<AnsweredQuery> {
		let question = question.trim();
		let context = assemble_context(passages, max_context_tokens, self.estimator.as_ref());

		if context.passages.is_empty() {
			tracing::info!(
				passage_count = passages.len(),
				max_context_tokens,
				"No passages available for synthesis; answering without evidence."
			);

			return Ok(no_evidence_answer(question, passages.len()));
		}

		let prompt = build_prompt(question, &context, OffsetDateTime::now_utc().date());
		let raw = tokio::time::timeout(self.timeout, self.generation.generate(&prompt))
			.await
			.map_err(|_| Error::SynthesisFailed {
				message: format!(
					"Generation request timed out after {} ms.",
					self.timeout.as_millis()
				),
			})?
			.map_err(Error::into_synthesis)?;
		let answer_text = raw.trim();

		if answer_text.is_empty() {
			return Err(Error::SynthesisFailed {
				message: "Generation model returned an empty answer.".to_string(),
			});
		}

		let citations = extract_citations(answer_text, &context.passages);

		tracing::info!(
			passage_count = passages.len(),
			passages_in_context = context.passages.len(),
			tokens_used = context.tokens_used,
			citation_count = citations.len(),
			"Synthesis completed."
		);

		Ok(AnsweredQuery {
			question: question.to_string(),
			answer_text: answer_text.to_string(),
			citations,
			passages_considered: passages.len() as u32,
			passages_in_context: context.passages.len() as u32,
		})
	}
}

/// Walks passages in rank order and keeps each one whose block still fits the remaining budget.
/// A passage that does not fit is skipped whole; later, smaller passages may still be included.
pub fn assemble_context(
	passages: &[RetrievedPassage],
	max_context_tokens: u32,
	estimator: &dyn TokenEstimator,
) -> AssembledContext {
	let budget = max_context_tokens as usize;
	let mut ordered: Vec<&RetrievedPassage> = passages.iter().collect();
	let mut context = AssembledContext::default();

	ordered.sort_by_key(|passage| passage.rank);

	for passage in ordered {
		let block = passage_block(context.passages.len() + 1, passage);
		let tokens = estimator.estimate(&block);

		if context.tokens_used + tokens > budget {
			tracing::debug!(
				chunk_id = %passage.chunk.chunk_id,
				tokens,
				remaining = budget - context.tokens_used,
				"Passage skipped; it does not fit the context budget."
			);

			continue;
		}

		context.tokens_used += tokens;
		context.text.push_str(&block);
		context.passages.push(passage.clone());
	}

	context
}

pub fn build_prompt(question: &str, context: &AssembledContext, today: Date) -> Prompt {
	let system = format!(
		"You are a financial market analyst assistant. Today's date is {today}.\n\
Answer the user's question using only the numbered news passages provided. Do not use outside \
knowledge.\n\
Stay objective and factual. Highlight relevant market trends, figures, dates and named companies \
when the passages contain them.\n\
After every sentence that relies on a passage, cite it inline with its marker, for example [S1] \
or [S1][S3]. Only cite markers that appear in the passages.\n\
If the passages do not contain enough information to answer, say explicitly that the available \
news coverage is insufficient and do not guess."
	);
	let user = format!("Passages:\n\n{}Question: {question}", context.text);

	Prompt { system, user }
}

/// Maps `[S<n>]` markers back to context passages in first-use order.
///
/// Markers outside the context are ignored. When nothing resolves, every context passage is
/// cited in fused-score order.
pub fn extract_citations(answer_text: &str, context: &[RetrievedPassage]) -> Vec<Citation> {
	let mut seen = HashSet::new();
	let mut cited = Vec::new();

	for number in marker_numbers(answer_text) {
		let Some(passage) = number.checked_sub(1).and_then(|idx| context.get(idx)) else {
			tracing::debug!(marker = number, "Ignoring citation marker outside the context.");

			continue;
		};

		if seen.insert(passage.document_id().to_string()) {
			cited.push(Citation::from(passage));
		}
	}

	if !cited.is_empty() {
		return cited;
	}

	tracing::debug!(
		passages_in_context = context.len(),
		"No citation markers resolved; citing every passage in context."
	);

	let mut fallback: Vec<&RetrievedPassage> = context.iter().collect();

	fallback.sort_by(|a, b| retrieval::cmp_passages(a, b));

	fallback.into_iter().map(Citation::from).collect()
}

pub fn no_evidence_answer(question: &str, passages_considered: usize) -> AnsweredQuery {
	AnsweredQuery {
		question: question.trim().to_string(),
		answer_text: NO_EVIDENCE_ANSWER.to_string(),
		citations: Vec::new(),
		passages_considered: passages_considered as u32,
		passages_in_context: 0,
	}
}

fn passage_block(number: usize, passage: &RetrievedPassage) -> String {
	let metadata = &passage.chunk.metadata;

	format!(
		"[S{number}] {} ({}, {})\n{}\n\n",
		metadata.title,
		metadata.source,
		metadata.published_at.date(),
		passage.chunk.text.trim()
	)
}

fn marker_numbers(text: &str) -> Vec<usize> {
	MARKER_GROUP
		.captures_iter(text)
		.filter_map(|caps| caps.get(1))
		.flat_map(|inner| MARKER_NUMBER.find_iter(inner.as_str()))
		.filter_map(|m| m.as_str().parse::<usize>().ok())
		.collect()
}

#[cfg(test)]
mod tests {
	use time::macros::{date, datetime};

	use mta_chunking::HeuristicEstimator;
	use mta_domain::{ChunkMetadata, IndexedChunk};

	use super::*;

	fn passage(document_id: &str, rank: u32, fused_score: f32, words: usize) -> RetrievedPassage {
		RetrievedPassage {
			chunk: IndexedChunk {
				chunk_id: format!("{document_id}-0"),
				document_id: document_id.to_string(),
				chunk_index: 0,
				vector: Vec::new(),
				text: vec!["growth"; words].join(" "),
				metadata: ChunkMetadata {
					title: format!("Report {document_id}"),
					source: "Reuters".to_string(),
					published_at: datetime!(2024-06-03 14:00:00 UTC),
					url: Some(format!("https://example.com/{document_id}")),
				},
			},
			vector_score: fused_score,
			keyword_score: 0.0,
			fused_score,
			rank,
		}
	}

	#[test]
	fn context_respects_budget_and_skips_oversized_passages() {
		let passages =
			vec![passage("a", 1, 0.9, 20), passage("b", 2, 0.8, 400), passage("c", 3, 0.7, 20)];
		let context = assemble_context(&passages, 100, &HeuristicEstimator);
		let ids: Vec<_> = context.passages.iter().map(|p| p.document_id()).collect();

		assert_eq!(ids, vec!["a", "c"]);
		assert!(context.tokens_used <= 100);
		assert!(context.text.contains("[S2] Report c"));
	}

	#[test]
	fn every_included_passage_costs_tokens() {
		let passages = vec![passage("a", 1, 0.9, 10), passage("b", 2, 0.8, 10)];
		let full = assemble_context(&passages, 1_000, &HeuristicEstimator);

		for skip in 0..passages.len() {
			let mut fewer = passages.clone();

			fewer.remove(skip);

			let reduced = assemble_context(&fewer, 1_000, &HeuristicEstimator);

			assert!(reduced.tokens_used < full.tokens_used);
		}
	}

	#[test]
	fn citations_follow_first_use_order() {
		let context =
			vec![passage("a", 1, 0.9, 5), passage("b", 2, 0.8, 5), passage("c", 3, 0.7, 5)];
		let citations =
			extract_citations("Oil rose [S3]. Rates held [S1, S3]. Unknown [S9].", &context);
		let ids: Vec<_> = citations.iter().map(|c| c.document_id.as_str()).collect();

		assert_eq!(ids, vec!["c", "a"]);
		assert_eq!(citations[0].relevance_score, 0.7);
	}

	#[test]
	fn marker_variants_are_recognized() {
		assert_eq!(
			marker_numbers("Up [S2]. Down [ s1 ; 3 ]. Flat [S4,S5]. Plain [7]."),
			vec![2, 1, 3, 4, 5]
		);
	}

	#[test]
	fn markerless_answers_cite_the_whole_context() {
		let context = vec![passage("b", 2, 0.4, 5), passage("a", 1, 0.9, 5)];
		let citations = extract_citations("Markets were mixed.", &context);
		let ids: Vec<_> = citations.iter().map(|c| c.document_id.as_str()).collect();

		assert_eq!(ids, vec!["a", "b"]);
	}

	#[test]
	fn prompt_carries_date_markers_and_question() {
		let context = assemble_context(&[passage("a", 1, 0.9, 5)], 1_000, &HeuristicEstimator);
		let prompt = build_prompt("How did growth stocks do?", &context, date!(2024 - 06 - 04));

		assert!(prompt.system.contains("2024-06-04"));
		assert!(prompt.system.contains("[S1]"));
		assert!(prompt.user.starts_with("Passages:"));
		assert!(prompt.user.contains("[S1] Report a (Reuters, 2024-06-03)"));
		assert!(prompt.user.ends_with("Question: How did growth stocks do?"));
		assert_eq!(prompt.messages().len(), 2);
	}
}
