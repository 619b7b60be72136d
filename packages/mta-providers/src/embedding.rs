use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

pub async fn embed(
	cfg: &mta_config::EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(crate::classify_send_error)?;
	let json: Value = crate::check_status(res).await?.json().await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response has {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	Ok(vectors)
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let response: EmbeddingResponse =
		serde_json::from_value(json).map_err(|err| Error::InvalidResponse {
			message: format!("Embedding response is malformed: {err}."),
		})?;
	let mut items = response.data;

	if items.iter().any(|item| item.embedding.iter().any(|value| !value.is_finite())) {
		return Err(Error::InvalidResponse {
			message: "Embedding response contains non-finite values.".to_string(),
		});
	}

	// Providers may answer out of order; `index` refers to the input position.
	items.sort_by_key(|item| item.index);

	Ok(items
		.into_iter()
		.map(|item| item.embedding.into_iter().map(|value| value as f32).collect())
		.collect())
}

#[derive(Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
	#[serde(default)]
	index: usize,
	embedding: Vec<f64>,
}
