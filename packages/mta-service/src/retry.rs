use std::{future::Future, time::Duration};

use crate::{Error, Result};

/// Bounded exponential backoff shared by every pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
}
impl RetryPolicy {
	pub fn from_config(cfg: &mta_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			base_backoff_ms: cfg.base_backoff_ms,
			max_backoff_ms: cfg.max_backoff_ms,
		}
	}

	/// Delay before the attempt following `attempt` (1-based).
	pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.max(1).saturating_sub(1).min(16);
		let base = self.base_backoff_ms.saturating_mul(1 << exp);

		Duration::from_millis(base.min(self.max_backoff_ms))
	}

	/// Runs `op` until it succeeds, fails with a non-retryable error, or the attempt bound is
	/// reached. The last error is returned unchanged.
	pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempt = 1;

		loop {
			match op().await {
				Ok(value) => return Ok(value),
				Err(err) if err.is_retryable() && attempt < self.max_attempts => {
					let backoff = self.backoff_for_attempt(attempt);

					tracing::warn!(
						operation,
						stage = err.stage().as_str(),
						attempt,
						max_attempts = self.max_attempts,
						backoff_ms = backoff.as_millis() as u64,
						error = %err,
						"Transient failure; retrying."
					);

					tokio::time::sleep(backoff).await;

					attempt += 1;
				},
				Err(err) => return Err(log_terminal(operation, attempt, err)),
			}
		}
	}
}

fn log_terminal(operation: &'static str, attempt: u32, err: Error) -> Error {
	tracing::warn!(
		operation,
		stage = err.stage().as_str(),
		attempt,
		retryable = err.is_retryable(),
		error = %err,
		"Operation failed."
	);

	err
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;

	fn policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy { max_attempts, base_backoff_ms: 1, max_backoff_ms: 4 }
	}

	#[test]
	fn backoff_doubles_then_caps() {
		let policy = RetryPolicy { max_attempts: 5, base_backoff_ms: 200, max_backoff_ms: 1_000 };

		assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
		assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
		assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(800));
		assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(1_000));
		assert_eq!(policy.backoff_for_attempt(40), Duration::from_millis(1_000));
	}

	#[tokio::test]
	async fn stops_at_the_attempt_bound() {
		let counter = AtomicU32::new(0);
		let calls = &counter;
		let result: Result<()> = policy(3)
			.run("test", move || async move {
				calls.fetch_add(1, Ordering::SeqCst);

				Err(Error::IndexUnavailable { message: "down".to_string() })
			})
			.await;

		assert!(matches!(result, Err(Error::IndexUnavailable { .. })));
		assert_eq!(counter.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn does_not_retry_refusals() {
		let counter = AtomicU32::new(0);
		let calls = &counter;
		let result: Result<()> = policy(3)
			.run("test", move || async move {
				calls.fetch_add(1, Ordering::SeqCst);

				Err(Error::ContentRefused { message: "policy".to_string() })
			})
			.await;

		assert!(matches!(result, Err(Error::ContentRefused { .. })));
		assert_eq!(counter.load(Ordering::SeqCst), 1);
	}
}
