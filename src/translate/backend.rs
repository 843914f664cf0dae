use std::time::Duration;

use crate::error::{BackendError, TranslateError};

/// A text-completion service: one prompt in, one completion out.
pub trait TranslationBackend {
    fn name(&self) -> &str;

    fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Blocking delay between attempts. Tests substitute a recording implementation.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on backend calls for one request, transient failures included.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_structure_retries: u32,
    /// Pause before re-sending after a malformed or mis-shaped response.
    pub retry_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_structure_retries: 2,
            retry_pause: Duration::from_secs(2),
        }
    }
}

/// Calls the backend until it answers, a non-retryable error occurs, or
/// `policy.max_retries` calls have been made.
pub fn call_with_backoff(
    backend: &dyn TranslationBackend,
    prompt: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<String, TranslateError> {
    let max_calls = policy.max_retries.max(1);
    let mut attempt = 0u32;
    loop {
        match backend.complete(prompt) {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retryable() && attempt + 1 < max_calls => {
                let wait = err.backoff(attempt, policy.initial_delay);
                log::warn!(
                    "{}: {err}; retrying in {:.1}s (attempt {}/{max_calls})",
                    backend.name(),
                    wait.as_secs_f64(),
                    attempt + 1
                );
                sleeper.sleep(wait);
                attempt += 1;
            }
            Err(err) => {
                log::error!("{}: {err}", backend.name());
                return Err(TranslateError::Backend {
                    attempts: attempt + 1,
                    source: err,
                });
            }
        }
    }
}
