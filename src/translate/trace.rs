use std::path::{Path, PathBuf};

use anyhow::Context;

/// Dumps prompts and raw responses of every attempt, when enabled.
pub struct TraceWriter {
    dir: PathBuf,
    stem: String,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, stem: &str, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self {
            dir,
            stem: sanitize_filename(stem),
            enabled,
        })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            stem: String::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// `<stem>.attempt<N>.<kind>.txt`, N starting at 1.
    pub fn write_attempt(&self, attempt: u32, kind: &str, text: &str) {
        if !self.enabled {
            return;
        }
        let name = format!("{}.attempt{attempt}.{kind}.txt", self.stem);
        if let Err(e) = self.write_named_text(&name, text) {
            log::warn!("{e:#}");
        }
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}
