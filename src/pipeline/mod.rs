//! File-level operations: extract, translate, reintegrate, and their combinations.

mod batch;

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::Settings;
use crate::document::Document;
use crate::progress::ConsoleProgress;
use crate::transfer::{ExtractedDocument, Granularity};
use crate::translate::trace::TraceWriter;
use crate::translate::{PromptContext, Sleeper, TranslationBackend, Translator};
use crate::walker::extract;
use crate::writer::{reintegrate, ReintegrationReport};

pub use batch::{collect_documents, BatchFailure, BatchOptions, BatchSummary};

/// What to translate into, and how. Unset fields fall back to the configuration.
#[derive(Clone, Debug, Default)]
pub struct TranslationRequest {
    pub target_lang: String,
    pub source_lang: Option<String>,
    pub style: Option<String>,
    pub topic: Option<String>,
    pub granularity: Option<Granularity>,
}

pub fn extract_file(
    input: &Path,
    output_json: &Path,
    granularity: Granularity,
    progress: &ConsoleProgress,
) -> anyhow::Result<ExtractedDocument> {
    progress.info(format!("Extracting text from {}...", input.display()));
    let doc = Document::open(input)?;
    let extracted = extract(&doc, granularity)?;
    extracted.save(output_json)?;
    progress.info(format!("Extracted {}", extracted.summary()));
    progress.info(format!("Saved to {}", output_json.display()));
    Ok(extracted)
}

pub fn reintegrate_file(
    original: &Path,
    translated_json: &Path,
    output: &Path,
    granularity: Granularity,
    progress: &ConsoleProgress,
) -> anyhow::Result<ReintegrationReport> {
    progress.info(format!("Loading translations from {}...", translated_json.display()));
    let translated = ExtractedDocument::load(translated_json)?;
    let mut doc = Document::open(original)?;
    let report = reintegrate(&mut doc, &translated, granularity)
        .with_context(|| format!("reintegrate into {}", original.display()))?;
    doc.save(output)?;

    progress.info(format!("Replaced {} text elements", report.replaced));
    if report.replaced != report.expected {
        log::warn!(
            "replaced {} of {} text elements in {}",
            report.replaced,
            report.expected,
            output.display()
        );
        progress.info(format!(
            "Warning: expected {} replacements, made {}",
            report.expected, report.replaced
        ));
    }
    progress.info(format!("Saved to {}", output.display()));
    Ok(report)
}

/// Everything a translating operation needs besides its files.
pub struct TranslationEnv<'a> {
    pub settings: &'a Settings,
    pub backend: &'a dyn TranslationBackend,
    pub sleeper: &'a dyn Sleeper,
    pub progress: &'a ConsoleProgress,
}

impl TranslationEnv<'_> {
    pub fn granularity(&self, req: &TranslationRequest) -> Granularity {
        req.granularity
            .unwrap_or_else(|| self.settings.default_granularity())
    }

    pub fn prompt_context(&self, req: &TranslationRequest) -> PromptContext {
        let style = req.style.as_deref().unwrap_or(self.settings.default_style());
        let topic = req.topic.as_deref().unwrap_or(self.settings.default_topic());
        PromptContext {
            target_lang: req.target_lang.clone(),
            source_lang: req.source_lang.clone(),
            style_instructions: self.settings.style_instructions(style),
            topic_instructions: self.settings.topic_instructions(topic),
        }
    }

    /// `trace_stem` names the trace files of this request, if tracing is configured.
    pub fn translate_document(
        &self,
        doc: &ExtractedDocument,
        req: &TranslationRequest,
        trace_stem: &str,
    ) -> anyhow::Result<ExtractedDocument> {
        let trace = match self.settings.trace_dir() {
            Some(dir) => TraceWriter::new(dir, trace_stem, true)?,
            None => TraceWriter::disabled(),
        };
        let translator = Translator::new(self.backend, self.sleeper, self.settings.retry_policy())
            .with_trace(trace);
        let translated = translator.translate(doc, &self.prompt_context(req))?;
        Ok(translated)
    }

    pub fn translate_json_file(
        &self,
        input_json: &Path,
        output_json: &Path,
        req: &TranslationRequest,
    ) -> anyhow::Result<ExtractedDocument> {
        let doc = ExtractedDocument::load(input_json)?;
        self.progress.info(format!(
            "Translating {} text elements to {} ({})...",
            doc.fragment_count(),
            req.target_lang,
            self.backend.name()
        ));
        let translated = self
            .translate_document(&doc, req, &file_stem(input_json))
            .with_context(|| format!("translate {}", input_json.display()))?;
        translated.save(output_json)?;
        self.progress.info(format!("Translation saved to {}", output_json.display()));
        Ok(translated)
    }

    /// Extract, translate and reintegrate through two temporary json files.
    pub fn translate_file(
        &self,
        input: &Path,
        output: &Path,
        req: &TranslationRequest,
    ) -> anyhow::Result<ReintegrationReport> {
        let granularity = self.granularity(req);
        let extracted_json = scoped_json("extracted")?;
        let translated_json = scoped_json("translated")?;

        self.progress.step(1, 3, format!("Extracting text from {}", input.display()));
        extract_file(input, extracted_json.path(), granularity, self.progress)?;

        self.progress.step(2, 3, format!("Translating to {}", req.target_lang));
        let doc = ExtractedDocument::load(extracted_json.path())?;
        let translated = self
            .translate_document(&doc, req, &file_stem(input))
            .with_context(|| format!("translate {}", input.display()))?;
        translated.save(translated_json.path())?;

        self.progress.step(3, 3, "Reintegrating translations");
        reintegrate_file(input, translated_json.path(), output, granularity, self.progress)
    }
}

fn scoped_json(prefix: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("office-translator-{prefix}-"))
        .suffix(".json")
        .tempfile()
        .context("create temp file")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// `<stem>_<target>.<ext>` next to the input.
pub fn default_output_path(input: &Path, target_lang: &str) -> PathBuf {
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = if ext.is_empty() {
        format!("{}_{target_lang}", file_stem(input))
    } else {
        format!("{}_{target_lang}.{ext}", file_stem(input))
    };
    input.with_file_name(name)
}
