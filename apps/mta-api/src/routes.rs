use axum::{
	Json, Router,
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};

use mta_domain::AnsweredQuery;
use mta_service::{AnswerOptions, Error as ServiceError, Stage};

use crate::state::AppState;

const SUGGESTED_QUESTIONS: [&str; 8] = [
	"What is the latest news about the stock market?",
	"What has the Federal Reserve said recently about interest rates?",
	"What are analysts saying about technology stocks?",
	"Is there recent news on inflation or other economic indicators?",
	"What is happening in cryptocurrency markets?",
	"Summarize the most recent earnings reports.",
	"What trends are driving markets this week?",
	"What moved the S&P 500 recently?",
];
const DEFAULT_SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
	pub question: String,
	pub top_k: Option<u32>,
	pub vector_weight: Option<f32>,
	pub max_context_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
	pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
	pub questions: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	stage: Stage,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	stage: Stage,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		stage: Stage,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), stage }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		let stage = err.stage();
		let message = err.to_string();

		match err {
			ServiceError::InvalidQuery { .. } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_query", message, stage),
			ServiceError::ContentRefused { .. } | ServiceError::GenerationRefused { .. } =>
				json_error(StatusCode::UNPROCESSABLE_ENTITY, "content_refused", message, stage),
			ServiceError::RetrievalUnavailable { .. }
			| ServiceError::EmbeddingUnavailable { .. }
			| ServiceError::IndexUnavailable { .. } =>
				json_error(
					StatusCode::SERVICE_UNAVAILABLE,
					"retrieval_unavailable",
					message,
					stage,
				),
			ServiceError::SynthesisFailed { .. } | ServiceError::GenerationUnavailable { .. } =>
				json_error(StatusCode::BAD_GATEWAY, "synthesis_failed", message, stage),
			ServiceError::Rejected { .. } => {
				tracing::error!(error = %message, %stage, "Upstream rejected the request.");

				json_error(StatusCode::BAD_GATEWAY, "upstream_rejected", message, stage)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, stage: self.stage };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/answer", post(answer))
		.route("/v1/suggestions", get(suggestions))
		.with_state(state)
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	stage: Stage,
) -> ApiError {
	ApiError::new(status, code, message, stage)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn answer(
	State(state): State<AppState>,
	Json(payload): Json<AnswerRequest>,
) -> Result<Json<AnsweredQuery>, ApiError> {
	let defaults = state.service.default_options();
	let options = AnswerOptions {
		top_k: payload.top_k.unwrap_or(defaults.top_k),
		vector_weight: payload.vector_weight.unwrap_or(defaults.vector_weight),
		max_context_tokens: payload.max_context_tokens.unwrap_or(defaults.max_context_tokens),
	};
	let response = state.service.answer_with(&payload.question, options).await?;

	Ok(Json(response))
}

async fn suggestions(Query(query): Query<SuggestionsQuery>) -> Json<SuggestionsResponse> {
	let limit = query.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT).min(SUGGESTED_QUESTIONS.len());

	Json(SuggestionsResponse { questions: SUGGESTED_QUESTIONS[..limit].to_vec() })
}
