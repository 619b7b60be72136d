use std::sync::Arc;

use axum::{
	Router,
	body::{self, Body},
	http::{Request, StatusCode},
};
use serde_json::Value;
use time::macros::datetime;
use tower::util::ServiceExt;

use mta_api::{routes, state::AppState};
use mta_chunking::HeuristicEstimator;
use mta_service::{Error, RagService, Stage};
use mta_testkit::{FakeEmbedding, FakeGeneration, FakeIndex, TEST_DIM};

fn app_with(index: FakeIndex, generation: FakeGeneration) -> Router {
	let collaborators = mta_testkit::collaborators(
		Arc::new(FakeEmbedding::new(TEST_DIM)),
		Arc::new(index),
		Arc::new(generation),
	);
	let service = RagService::with_collaborators(
		mta_testkit::test_config(),
		collaborators,
		Arc::new(HeuristicEstimator),
	);

	routes::router(AppState::from_service(service))
}

fn news_index() -> FakeIndex {
	FakeIndex::with_chunks(vec![
		mta_testkit::chunk(
			"fed-1",
			"doc-fed",
			"The Federal Reserve left interest rates unchanged in May.",
			datetime!(2024-05-01 18:00:00 UTC),
		),
		mta_testkit::chunk(
			"oil-1",
			"doc-oil",
			"Oil prices rose after producers extended supply cuts.",
			datetime!(2024-05-02 09:00:00 UTC),
		),
	])
}

async fn post_answer(app: Router, payload: Value) -> (StatusCode, Value) {
	let response = app
		.oneshot(
			Request::builder()
				.method("POST")
				.uri("/v1/answer")
				.header("content-type", "application/json")
				.body(Body::from(payload.to_string()))
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/answer.");
	let status = response.status();
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json = serde_json::from_slice(&bytes).expect("Response body is not JSON.");

	(status, json)
}

#[tokio::test]
async fn health_ok() {
	let app = app_with(news_index(), FakeGeneration::replying("Unused."));
	let response = app
		.oneshot(
			Request::builder()
				.uri("/health")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /health.");

	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn answer_returns_cited_json() {
	let app = app_with(news_index(), FakeGeneration::replying("Rates were held [S1]."));
	let (status, json) = post_answer(
		app,
		serde_json::json!({ "question": "What did the Federal Reserve do with interest rates?" }),
	)
	.await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(json["answer_text"], "Rates were held [S1].");
	assert_eq!(json["citations"][0]["document_id"], "doc-fed");
	assert_eq!(json["citations"][0]["published_at"], "2024-05-01T18:00:00Z");
}

#[tokio::test]
async fn blank_question_is_a_bad_request() {
	let app = app_with(news_index(), FakeGeneration::replying("Unused."));
	let (status, json) = post_answer(app, serde_json::json!({ "question": "  " })).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(json["error_code"], "invalid_query");
	assert_eq!(json["stage"], "query");
}

#[tokio::test]
async fn index_outage_is_service_unavailable() {
	let index = news_index();

	index.fail_next(10);

	let app = app_with(index, FakeGeneration::replying("Unused."));
	let (status, json) = post_answer(app, serde_json::json!({ "question": "Oil prices?" })).await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(json["error_code"], "retrieval_unavailable");
	assert_eq!(json["stage"], "index");
}

#[tokio::test]
async fn refusal_is_unprocessable() {
	let generation = FakeGeneration::replying("Unused.");

	generation.push(Err(Error::GenerationRefused { message: "Policy.".to_string() }));

	let app = app_with(news_index(), generation);
	let (status, json) = post_answer(app, serde_json::json!({ "question": "Oil prices?" })).await;

	assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
	assert_eq!(json["error_code"], "content_refused");
	assert_eq!(json["stage"], "generation");
}

#[tokio::test]
async fn rejected_generation_reports_its_stage() {
	let generation = FakeGeneration::replying("Unused.");

	generation.push(Err(Error::Rejected {
		stage: Stage::Generation,
		message: "Provider returned HTTP 401: invalid api key".to_string(),
	}));

	let app = app_with(news_index(), generation);
	let (status, json) = post_answer(app, serde_json::json!({ "question": "Oil prices?" })).await;

	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert_eq!(json["error_code"], "upstream_rejected");
	assert_eq!(json["stage"], "generation");
}

#[tokio::test]
async fn suggestions_respect_limit() {
	let app = app_with(news_index(), FakeGeneration::replying("Unused."));
	let response = app
		.oneshot(
			Request::builder()
				.uri("/v1/suggestions?limit=3")
				.body(Body::empty())
				.expect("Failed to build request."),
		)
		.await
		.expect("Failed to call /v1/suggestions.");
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Failed to read response body.");
	let json: Value = serde_json::from_slice(&bytes).expect("Response body is not JSON.");

	assert_eq!(json["questions"].as_array().map(Vec::len), Some(3));
}
