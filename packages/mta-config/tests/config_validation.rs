use toml::Value;

use mta_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let mut table = root.as_table_mut().expect("Sample config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn parse(raw: &str) -> mta_config::Result<Config> {
	mta_config::from_toml_str(raw)
}

fn validation_message(raw: &str) -> String {
	match parse(raw) {
		Err(Error::Invalid { message }) => message,
		Err(err) => panic!("Expected validation error, got {err:?}."),
		Ok(_) => panic!("Expected validation error, got a valid config."),
	}
}

#[test]
fn sample_config_is_valid() {
	let cfg = parse(SAMPLE_CONFIG_TOML).expect("Sample config must be valid.");

	assert_eq!(cfg.retrieval.top_k, 5);
	assert_eq!(cfg.providers.embedding.dimensions, cfg.storage.qdrant.vector_dim);
	assert_eq!(cfg.synthesis.estimator, "heuristic");
}

#[test]
fn blank_tokenizer_repo_is_normalized_to_none() {
	let cfg = parse(SAMPLE_CONFIG_TOML).expect("Sample config must be valid.");

	assert!(cfg.synthesis.tokenizer_repo.is_none());
}

#[test]
fn tokenizer_estimator_defaults_repo_to_embedding_model() {
	let raw = sample_with("synthesis", "estimator", Value::String("Tokenizer".to_string()));
	let cfg = parse(&raw).expect("Config must be valid.");

	assert_eq!(cfg.synthesis.estimator, "tokenizer");
	assert_eq!(cfg.synthesis.tokenizer_repo.as_deref(), Some("text-embedding-3-small"));
}

#[test]
fn omitted_optional_sections_use_defaults() {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root.as_table_mut().expect("Sample config must be a table.");

	for section in ["retrieval", "chunking", "retry", "cache", "ingest"] {
		table.remove(section);
	}

	let raw = toml::to_string(&root).expect("Failed to render sample config.");
	let cfg = parse(&raw).expect("Config must be valid.");

	assert_eq!(cfg.retrieval.top_k, 5);
	assert_eq!(cfg.retrieval.overfetch_factor, 3);
	assert_eq!(cfg.chunking.max_tokens, 500);
	assert_eq!(cfg.chunking.overlap_tokens, 100);
	assert_eq!(cfg.retry.max_attempts, 3);
	assert!(!cfg.cache.enabled);
	assert_eq!(cfg.ingest.min_body_chars, 100);
}

#[test]
fn dimension_mismatch_is_rejected() {
	let raw = sample_with("storage.qdrant", "vector_dim", Value::Integer(768));

	assert_eq!(
		validation_message(&raw),
		"providers.embedding.dimensions must match storage.qdrant.vector_dim."
	);
}

#[test]
fn vector_weight_out_of_range_is_rejected() {
	let raw = sample_with("retrieval", "vector_weight", Value::Float(1.5));

	assert_eq!(validation_message(&raw), "retrieval.vector_weight must be in the range 0.0-1.0.");
}

#[test]
fn zero_top_k_is_rejected() {
	let raw = sample_with("retrieval", "top_k", Value::Integer(0));

	assert_eq!(validation_message(&raw), "retrieval.top_k must be greater than zero.");
}

#[test]
fn unknown_estimator_is_rejected() {
	let raw = sample_with("synthesis", "estimator", Value::String("words".to_string()));

	assert_eq!(
		validation_message(&raw),
		"synthesis.estimator must be one of heuristic or tokenizer."
	);
}

#[test]
fn overlap_must_be_smaller_than_chunk() {
	let raw = sample_with("chunking", "overlap_tokens", Value::Integer(500));

	assert_eq!(
		validation_message(&raw),
		"chunking.overlap_tokens must be less than chunking.max_tokens."
	);
}

#[test]
fn zero_retry_attempts_are_rejected() {
	let raw = sample_with("retry", "max_attempts", Value::Integer(0));

	assert_eq!(validation_message(&raw), "retry.max_attempts must be greater than zero.");
}

#[test]
fn inverted_backoff_bounds_are_rejected() {
	let raw = sample_with("retry", "base_backoff_ms", Value::Integer(5_000));

	assert_eq!(
		validation_message(&raw),
		"retry.base_backoff_ms must not exceed retry.max_backoff_ms."
	);
}

#[test]
fn blank_api_key_is_rejected() {
	let raw = sample_with("providers.generation", "api_key", Value::String("  ".to_string()));

	assert_eq!(validation_message(&raw), "Provider generation api_key must be non-empty.");
}

#[test]
fn missing_file_reports_path() {
	let path = std::path::Path::new("/nonexistent/mta.toml");
	let err = mta_config::load(path).expect_err("Loading a missing file must fail.");

	assert!(matches!(err, Error::Read { .. }));
}
