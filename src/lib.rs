//! Translate `.pptx` and `.docx` documents through an LLM while keeping their formatting.
//!
//! Text is extracted run by run (or per text frame) into a small JSON structure, translated
//! as a whole, validated for shape, and written back into the same runs.

pub mod config;
pub mod document;
pub mod error;
pub mod ooxml;
pub mod pipeline;
pub mod progress;
pub mod transfer;
pub mod translate;
pub mod walker;
pub mod writer;
