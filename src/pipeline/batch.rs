use std::path::{Path, PathBuf};

use anyhow::Context;
use walkdir::WalkDir;

use super::{TranslationEnv, TranslationRequest};
use crate::transfer::DocumentKind;

#[derive(Clone, Copy, Debug, Default)]
pub struct BatchOptions {
    pub recursive: bool,
    /// Re-translate documents whose output already exists.
    pub overwrite: bool,
}

#[derive(Clone, Debug)]
pub struct BatchFailure {
    /// Relative to the input directory.
    pub path: PathBuf,
    pub error: String,
}

#[derive(Clone, Debug, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// `.pptx` / `.docx` files under `dir`, sorted by path. Office lock files (`~$...`) are
/// ignored.
pub fn collect_documents(dir: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("walk directory: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_lock = entry.file_name().to_string_lossy().starts_with("~$");
        if !is_lock && DocumentKind::from_path(path).is_some() {
            out.push(path.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

impl TranslationEnv<'_> {
    /// Translates every document under `input_dir` into the same relative path under
    /// `output_dir`. One failing document never stops the batch.
    pub fn translate_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        req: &TranslationRequest,
        opts: BatchOptions,
    ) -> anyhow::Result<BatchSummary> {
        let files = collect_documents(input_dir, opts.recursive)?;
        let total = files.len();
        self.progress.info(format!(
            "Found {total} document(s) in {}",
            input_dir.display()
        ));

        let mut summary = BatchSummary::default();
        for (i, path) in files.iter().enumerate() {
            let rel = path.strip_prefix(input_dir).unwrap_or(path.as_path()).to_path_buf();
            let output = output_dir.join(&rel);
            let name = rel.display().to_string();

            if output.exists() && !opts.overwrite {
                self.progress.item(i + 1, total, &name, "skipped (output exists)");
                summary.skipped += 1;
                continue;
            }

            self.progress.item(i + 1, total, &name, "translating");
            match self.translate_file(path, &output, req) {
                Ok(_) => {
                    self.progress.item(i + 1, total, &name, "done");
                    summary.succeeded += 1;
                }
                Err(e) => {
                    log::error!("{name}: {e:#}");
                    self.progress.item(i + 1, total, &name, &format!("FAILED: {e:#}"));
                    summary.failed.push(BatchFailure {
                        path: rel,
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        self.progress.info(format!(
            "Batch complete: {} succeeded, {} skipped, {} failed",
            summary.succeeded,
            summary.skipped,
            summary.failed.len()
        ));
        for f in &summary.failed {
            self.progress.info(format!("  failed: {}", f.path.display()));
        }
        Ok(summary)
    }
}
