//! Google Gemini `generateContent` over blocking HTTP.

use std::time::Duration;

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};

use super::backend::TranslationBackend;
use crate::error::BackendError;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";

static RETRY_DELAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).expect("retry delay regex")
});

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.into(),
        })
    }

    fn url(&self) -> String {
        let base = if self.endpoint.is_empty() {
            DEFAULT_ENDPOINT
        } else {
            self.endpoint.trim_end_matches('/')
        };
        format!("{base}/v1beta/models/{}:generateContent", self.model)
    }
}

impl TranslationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let resp = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .map_err(classify_transport)?;

        let status = resp.status().as_u16();
        let header_hint = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_seconds);
        if !resp.status().is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(classify_status(status, header_hint, &text));
        }

        let parsed: GenerateResponse = resp.json().map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                BackendError::Timeout(e.to_string())
            } else {
                BackendError::Fatal(format!("decode generateContent response: {e}"))
            }
        })?;
        extract_text(parsed)
    }
}

fn extract_text(resp: GenerateResponse) -> Result<String, BackendError> {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(BackendError::Fatal(format!("empty response: {reason}")));
    };
    Ok(candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default())
}

/// Error text never carries the request url.
fn classify_transport(e: reqwest::Error) -> BackendError {
    let e = e.without_url();
    if e.is_timeout() {
        BackendError::Timeout(e.to_string())
    } else if e.is_connect() {
        BackendError::Unavailable {
            retry_after: None,
            message: e.to_string(),
        }
    } else {
        BackendError::Fatal(e.to_string())
    }
}

/// Maps an HTTP failure to a [`BackendError`]. The retry hint comes from the `Retry-After`
/// header or, failing that, the `retryDelay` of the error body.
pub fn classify_status(status: u16, header_hint: Option<Duration>, body: &str) -> BackendError {
    let retry_after = header_hint.or_else(|| retry_delay_from_body(body));
    let message = format!("HTTP {status}: {}", snippet(body, 300));
    match status {
        429 => BackendError::RateLimited {
            retry_after,
            message,
        },
        500 | 502 | 503 => BackendError::Unavailable {
            retry_after,
            message,
        },
        504 => BackendError::Timeout(message),
        _ => BackendError::Fatal(message),
    }
}

fn retry_delay_from_body(body: &str) -> Option<Duration> {
    let caps = RETRY_DELAY_RE.captures(body)?;
    parse_seconds(caps.get(1)?.as_str())
}

fn parse_seconds(s: &str) -> Option<Duration> {
    let secs: f64 = s.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
}

fn snippet(s: &str, max_chars: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{classify_status, extract_text, GeminiBackend, GenerateResponse};
    use crate::error::BackendError;
    use crate::translate::backend::TranslationBackend;

    #[test]
    fn transport_errors_do_not_reveal_the_api_key() {
        let backend = GeminiBackend::new(
            "SECRET-KEY-123",
            "m",
            "http://127.0.0.1:9",
            Duration::from_secs(2),
        )
        .expect("client");
        let err = backend.complete("hi").expect_err("nothing listens on port 9");
        let shown = format!("{err} {err:?}");
        assert!(!shown.contains("SECRET-KEY-123"), "{shown}");
    }

    #[test]
    fn statuses_map_to_retry_classes() {
        assert!(matches!(
            classify_status(429, None, ""),
            BackendError::RateLimited { retry_after: None, .. }
        ));
        assert!(matches!(
            classify_status(503, None, ""),
            BackendError::Unavailable { .. }
        ));
        assert!(matches!(classify_status(504, None, ""), BackendError::Timeout(_)));
        assert!(matches!(classify_status(400, None, "bad"), BackendError::Fatal(_)));
    }

    #[test]
    fn retry_delay_is_read_from_error_body() {
        let body = r#"{"error":{"code":429,"details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"23s"}]}}"#;
        match classify_status(429, None, body) {
            BackendError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(23)))
            }
            other => panic!("unexpected {other:?}"),
        }
        match classify_status(503, Some(Duration::from_secs(4)), body) {
            BackendError::Unavailable { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(4)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"slides\":"},{"text":"[]}"}]}}]}"#,
        )
        .expect("json");
        assert_eq!(extract_text(resp).expect("text"), r#"{"slides":[]}"#);

        let blocked: GenerateResponse =
            serde_json::from_str(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).expect("json");
        assert!(matches!(extract_text(blocked), Err(BackendError::Fatal(m)) if m.contains("SAFETY")));
    }
}
