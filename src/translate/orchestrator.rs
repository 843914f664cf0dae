//! Request / validate / retry loop around a [`TranslationBackend`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::backend::{call_with_backoff, RetryPolicy, Sleeper, TranslationBackend};
use super::prompts::{build_prompt, PromptContext};
use super::trace::TraceWriter;
use crate::error::TranslateError;
use crate::transfer::{ExtractedDocument, Unit};

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?\s*```\s*$").expect("code fence regex")
});

const SAMPLE_LIMIT: usize = 5;
const PREVIEW_CHARS: usize = 50;

/// Why a parsed response was not accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeMismatch {
    UnitCount {
        expected: usize,
        actual: usize,
    },
    /// `unit` is 0-based.
    FragmentCount {
        unit: usize,
        expected: usize,
        actual: usize,
        samples: String,
    },
}

#[derive(Debug)]
pub enum RetryReason {
    Parse(String),
    Structure(ShapeMismatch),
}

#[derive(Debug)]
pub enum AttemptOutcome {
    Accepted(ExtractedDocument),
    Retry(RetryReason),
    Fatal(TranslateError),
}

pub struct Translator<'a> {
    backend: &'a dyn TranslationBackend,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
    trace: TraceWriter,
}

impl<'a> Translator<'a> {
    pub fn new(
        backend: &'a dyn TranslationBackend,
        sleeper: &'a dyn Sleeper,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            sleeper,
            policy,
            trace: TraceWriter::disabled(),
        }
    }

    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = trace;
        self
    }

    /// Translates `doc` and returns a structure with exactly the same shape.
    pub fn translate(
        &self,
        doc: &ExtractedDocument,
        ctx: &PromptContext,
    ) -> Result<ExtractedDocument, TranslateError> {
        let label = doc.kind.unit_label();
        let mut retry_attempt = 0u32;
        let mut parse_failures = 0u32;
        let mut calls = 0u32;

        loop {
            calls += 1;
            match self.attempt(doc, ctx, retry_attempt, calls) {
                AttemptOutcome::Accepted(out) => return Ok(out),
                AttemptOutcome::Fatal(err) => return Err(err),
                AttemptOutcome::Retry(RetryReason::Parse(detail)) => {
                    parse_failures += 1;
                    if parse_failures > 1 {
                        return Err(TranslateError::MalformedResponse {
                            attempts: calls,
                            detail,
                        });
                    }
                    log::warn!("response is not valid transfer json ({detail}); retrying");
                }
                AttemptOutcome::Retry(RetryReason::Structure(mismatch)) => {
                    parse_failures = 0;
                    if retry_attempt >= self.policy.max_structure_retries {
                        return Err(mismatch_error(mismatch, label, calls));
                    }
                    retry_attempt += 1;
                    log::warn!(
                        "{}; retrying with stricter prompt ({retry_attempt}/{})",
                        describe(&mismatch, label),
                        self.policy.max_structure_retries
                    );
                }
            }
            self.sleeper.sleep(self.policy.retry_pause);
        }
    }

    fn attempt(
        &self,
        doc: &ExtractedDocument,
        ctx: &PromptContext,
        retry_attempt: u32,
        call_no: u32,
    ) -> AttemptOutcome {
        let prompt = match build_prompt(doc, ctx, retry_attempt) {
            Ok(p) => p,
            Err(e) => return AttemptOutcome::Fatal(e.into()),
        };
        self.trace.write_attempt(call_no, "prompt", &prompt);

        let raw = match call_with_backoff(self.backend, &prompt, &self.policy, self.sleeper) {
            Ok(raw) => raw,
            Err(e) => return AttemptOutcome::Fatal(e),
        };
        self.trace.write_attempt(call_no, "response", &raw);
        log::debug!("{}: {} chars received", self.backend.name(), raw.chars().count());

        evaluate_response(doc, &raw)
    }
}

/// Parses and validates one raw completion against the request.
pub fn evaluate_response(original: &ExtractedDocument, raw: &str) -> AttemptOutcome {
    let parsed = match parse_response(raw) {
        Ok(parsed) => parsed,
        Err(detail) => return AttemptOutcome::Retry(RetryReason::Parse(detail)),
    };
    if parsed.kind != original.kind {
        return AttemptOutcome::Retry(RetryReason::Parse(format!(
            "expected \"{}\" at the root, got \"{}\"",
            original.kind.root_key(),
            parsed.kind.root_key()
        )));
    }
    match validate_shape(original, &parsed) {
        Ok(()) => AttemptOutcome::Accepted(parsed),
        Err(mismatch) => AttemptOutcome::Retry(RetryReason::Structure(mismatch)),
    }
}

/// Strips an optional Markdown code fence and parses the transfer json. Text around the
/// first JSON object is tolerated.
pub fn parse_response(raw: &str) -> Result<ExtractedDocument, String> {
    let body = match CODE_FENCE_RE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw.trim(),
    };
    match ExtractedDocument::from_json(body) {
        Ok(doc) => Ok(doc),
        Err(first) => {
            let start = body
                .find('{')
                .ok_or_else(|| format!("no json object in response ({first:#})"))?;
            let mut de = serde_json::Deserializer::from_str(&body[start..]);
            ExtractedDocument::deserialize(&mut de).map_err(|e| format!("{e}"))
        }
    }
}

/// Accepts `translated` iff it has as many units as `original` and every unit has as many
/// fragments. The first mismatching unit decides.
pub fn validate_shape(
    original: &ExtractedDocument,
    translated: &ExtractedDocument,
) -> Result<(), ShapeMismatch> {
    if original.units.len() != translated.units.len() {
        return Err(ShapeMismatch::UnitCount {
            expected: original.units.len(),
            actual: translated.units.len(),
        });
    }
    for (i, (orig, trans)) in original.units.iter().zip(&translated.units).enumerate() {
        if orig.texts.len() != trans.texts.len() {
            return Err(ShapeMismatch::FragmentCount {
                unit: i,
                expected: orig.texts.len(),
                actual: trans.texts.len(),
                samples: samples(orig, trans),
            });
        }
    }
    Ok(())
}

fn samples(orig: &Unit, trans: &Unit) -> String {
    let mut out = String::new();
    for (title, unit) in [("original", orig), ("translated", trans)] {
        out.push_str(&format!("  {title} texts ({}):\n", unit.texts.len()));
        for (idx, text) in unit.texts.iter().take(SAMPLE_LIMIT).enumerate() {
            out.push_str(&format!("    [{idx}] {:?}\n", preview(text)));
        }
        if unit.texts.len() > SAMPLE_LIMIT {
            out.push_str(&format!("    ... and {} more\n", unit.texts.len() - SAMPLE_LIMIT));
        }
    }
    out
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn describe(mismatch: &ShapeMismatch, label: &str) -> String {
    match mismatch {
        ShapeMismatch::UnitCount { expected, actual } => {
            format!("{label} count mismatch: expected {expected}, got {actual}")
        }
        ShapeMismatch::FragmentCount {
            unit,
            expected,
            actual,
            ..
        } => format!(
            "text count mismatch in {label} {}: expected {expected}, got {actual}",
            unit + 1
        ),
    }
}

fn mismatch_error(mismatch: ShapeMismatch, label: &'static str, attempts: u32) -> TranslateError {
    match mismatch {
        ShapeMismatch::UnitCount { expected, actual } => TranslateError::UnitCountMismatch {
            label,
            expected,
            actual,
            attempts,
        },
        ShapeMismatch::FragmentCount {
            unit,
            expected,
            actual,
            samples,
        } => TranslateError::FragmentCountMismatch {
            label,
            unit: unit + 1,
            expected,
            actual,
            attempts,
            samples,
        },
    }
}
