pub mod embedding;
pub mod generation;

mod error;

pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client, Response, StatusCode,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

const MAX_ERROR_BODY_CHARS: usize = 512;
const REFUSAL_CODES: [&str; 2] = ["content_filter", "content_policy_violation"];

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

pub(crate) fn client(timeout_ms: u64) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(timeout_ms)).build()?)
}

pub(crate) fn classify_send_error(err: reqwest::Error) -> Error {
	if err.is_timeout() {
		return Error::Timeout { message: err.to_string() };
	}

	Error::Reqwest(err)
}

/// Turns a non-success response into a typed error, reading the body for context.
pub(crate) async fn check_status(res: Response) -> Result<Response> {
	let status = res.status();

	if status.is_success() {
		return Ok(res);
	}

	let body = res.text().await.unwrap_or_default();

	Err(classify_status(status, &body))
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> Error {
	let message = truncate(body);

	if status == StatusCode::TOO_MANY_REQUESTS {
		return Error::RateLimited { message };
	}
	if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
		return Error::Timeout { message };
	}
	if status.is_client_error() && is_refusal_body(body) {
		return Error::Refused { message };
	}

	Error::Http { status: status.as_u16(), message }
}

fn is_refusal_body(body: &str) -> bool {
	let Ok(json) = serde_json::from_str::<Value>(body) else {
		return false;
	};
	let error = json.get("error").unwrap_or(&json);

	["code", "type"].iter().any(|field| {
		error
			.get(*field)
			.and_then(Value::as_str)
			.map(|value| REFUSAL_CODES.contains(&value))
			.unwrap_or(false)
	})
}

fn truncate(body: &str) -> String {
	let trimmed = body.trim();

	if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
		return trimmed.to_string();
	}

	let mut out: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();

	out.push_str("...");

	out
}
