use std::time::Duration;

use thiserror::Error;

/// Failures reported by a translation backend, classified by how the caller may react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("service unavailable: {message}")]
    Unavailable {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("backend error: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }

    /// Wait before the call following failed attempt `attempt` (0-based). Server hints win
    /// over exponential backoff; timeouts back off one step further.
    pub fn backoff(&self, attempt: u32, initial: Duration) -> Duration {
        let factor = |exp: u32| 2u32.saturating_pow(exp);
        match self {
            Self::RateLimited { retry_after, .. } | Self::Unavailable { retry_after, .. } => {
                retry_after.unwrap_or_else(|| initial.saturating_mul(factor(attempt)))
            }
            Self::Timeout(_) => initial.saturating_mul(factor(attempt + 1)),
            Self::Fatal(_) => Duration::ZERO,
        }
    }
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("encode transfer json: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("translation backend failed after {attempts} call(s): {source}")]
    Backend {
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("could not parse the translation response as transfer json after {attempts} attempt(s): {detail}")]
    MalformedResponse { attempts: u32, detail: String },

    #[error("{label} count mismatch after {attempts} attempt(s): expected {expected}, got {actual}")]
    UnitCountMismatch {
        label: &'static str,
        expected: usize,
        actual: usize,
        attempts: u32,
    },

    #[error(
        "text count mismatch in {label} {unit} after {attempts} attempt(s): expected {expected}, got {actual}\n{samples}"
    )]
    FragmentCountMismatch {
        label: &'static str,
        /// 1-based.
        unit: usize,
        expected: usize,
        actual: usize,
        attempts: u32,
        samples: String,
    },
}
