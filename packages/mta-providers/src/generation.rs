use serde_json::Value;

use crate::{Error, Result};

/// One chat-completion call. Retrying is left to the caller.
pub async fn generate(cfg: &mta_config::LlmProviderConfig, messages: &[Value]) -> Result<String> {
	let client = crate::client(cfg.timeout_ms)?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await
		.map_err(crate::classify_send_error)?;
	let json: Value = crate::check_status(res).await?.json().await?;

	parse_generation_response(&json)
}

fn parse_generation_response(json: &Value) -> Result<String> {
	let choice = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Generation response is missing choices.".to_string(),
		})?;

	if choice.get("finish_reason").and_then(|v| v.as_str()) == Some("content_filter") {
		return Err(Error::Refused {
			message: "Generation stopped by the provider content filter.".to_string(),
		});
	}

	let message = choice.get("message").ok_or_else(|| Error::InvalidResponse {
		message: "Generation choice is missing message.".to_string(),
	})?;

	if let Some(refusal) = message.get("refusal").and_then(|v| v.as_str())
		&& !refusal.trim().is_empty()
	{
		return Err(Error::Refused { message: refusal.trim().to_string() });
	}

	message.get("content").and_then(|v| v.as_str()).map(str::to_string).ok_or_else(|| {
		Error::InvalidResponse { message: "Generation message is missing content.".to_string() }
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "finish_reason": "stop", "message": { "content": "Rates held [S1]." } }
			]
		});

		assert_eq!(parse_generation_response(&json).expect("parse failed"), "Rates held [S1].");
	}

	#[test]
	fn content_filter_finish_is_a_refusal() {
		let json = serde_json::json!({
			"choices": [{ "finish_reason": "content_filter", "message": { "content": "" } }]
		});
		let err = parse_generation_response(&json).expect_err("refusal expected");

		assert!(err.is_refusal());
	}

	#[test]
	fn explicit_refusal_field_is_a_refusal() {
		let json = serde_json::json!({
			"choices": [{ "message": { "content": null, "refusal": "I can't help with that." } }]
		});
		let err = parse_generation_response(&json).expect_err("refusal expected");

		assert!(matches!(err, Error::Refused { message } if message == "I can't help with that."));
	}

	#[test]
	fn missing_choices_is_malformed_and_retryable() {
		let err = parse_generation_response(&serde_json::json!({})).expect_err("error expected");

		assert!(matches!(err, Error::InvalidResponse { .. }));
		assert!(err.is_retryable());
	}
}
