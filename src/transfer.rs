//! JSON transfer format exchanged between extraction, translation and reintegration.
//!
//! ```json
//! {"slides": [{"texts": ["Hello", "World"]}]}
//! {"paragraphs": [{"texts": ["Intro"]}, {"texts": []}]}
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    Presentation,
    Wordprocessing,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pptx" => Some(Self::Presentation),
            "docx" => Some(Self::Wordprocessing),
            _ => None,
        }
    }

    pub fn root_key(self) -> &'static str {
        match self {
            Self::Presentation => "slides",
            Self::Wordprocessing => "paragraphs",
        }
    }

    pub fn unit_label(self) -> &'static str {
        match self {
            Self::Presentation => "slide",
            Self::Wordprocessing => "paragraph",
        }
    }
}

/// Fragment granularity shared by extraction and reintegration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One fragment per formatting run.
    #[default]
    Run,
    /// One fragment per text frame, table cell or paragraph.
    Aggregate,
}

impl FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(Self::Run),
            "aggregate" => Ok(Self::Aggregate),
            other => Err(anyhow!("unknown granularity: {other} (expected run|aggregate)")),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Run => "run",
            Self::Aggregate => "aggregate",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub texts: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransferRepr", into = "TransferRepr")]
pub struct ExtractedDocument {
    pub kind: DocumentKind,
    pub units: Vec<Unit>,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TransferRepr {
    Slides(Vec<Unit>),
    Paragraphs(Vec<Unit>),
}

impl From<TransferRepr> for ExtractedDocument {
    fn from(r: TransferRepr) -> Self {
        match r {
            TransferRepr::Slides(units) => Self {
                kind: DocumentKind::Presentation,
                units,
            },
            TransferRepr::Paragraphs(units) => Self {
                kind: DocumentKind::Wordprocessing,
                units,
            },
        }
    }
}

impl From<ExtractedDocument> for TransferRepr {
    fn from(d: ExtractedDocument) -> Self {
        match d.kind {
            DocumentKind::Presentation => Self::Slides(d.units),
            DocumentKind::Wordprocessing => Self::Paragraphs(d.units),
        }
    }
}

impl ExtractedDocument {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind,
            units: Vec::new(),
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.units.iter().map(|u| u.texts.len()).sum()
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("parse transfer json")
    }

    pub fn to_json_pretty(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serialize transfer json")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read json: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parse json: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let text = self.to_json_pretty()?;
        std::fs::write(path, text).with_context(|| format!("write json: {}", path.display()))
    }

    /// Human summary such as `12 text elements from 3 slides`.
    pub fn summary(&self) -> String {
        format!(
            "{} text elements from {} {}s",
            self.fragment_count(),
            self.units.len(),
            self.kind.unit_label()
        )
    }
}

/// Hands out fragments of a (translated) document in extraction order.
///
/// The writer calls [`TextIterator::advance_unit`] once per unit it visits, so a unit whose
/// fragments were not all consumed never shifts the following units.
pub struct TextIterator<'a> {
    units: &'a [Unit],
    unit: usize,
    fragment: usize,
}

impl<'a> TextIterator<'a> {
    pub fn new(doc: &'a ExtractedDocument) -> Self {
        Self {
            units: &doc.units,
            unit: 0,
            fragment: 0,
        }
    }

    /// Next fragment of the current unit, or `None` when the unit (or document) is exhausted.
    pub fn next_text(&mut self) -> Option<&'a str> {
        let text = self.units.get(self.unit)?.texts.get(self.fragment)?;
        self.fragment += 1;
        Some(text.as_str())
    }

    pub fn advance_unit(&mut self) {
        if self.unit < self.units.len() {
            self.unit += 1;
        }
        self.fragment = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.unit >= self.units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentKind, ExtractedDocument, Granularity, TextIterator, Unit};

    fn unit(texts: &[&str]) -> Unit {
        Unit {
            texts: texts.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn root_key_follows_document_kind() {
        let doc = ExtractedDocument {
            kind: DocumentKind::Presentation,
            units: vec![unit(&["Hello", ""]), unit(&[])],
        };
        let json = serde_json::to_string(&doc).expect("serialize");
        assert_eq!(json, r#"{"slides":[{"texts":["Hello",""]},{"texts":[]}]}"#);

        let back = ExtractedDocument::from_json(&json).expect("parse");
        assert_eq!(back, doc);

        let paras = ExtractedDocument::from_json(r#"{"paragraphs":[{"texts":["a"]}]}"#)
            .expect("parse paragraphs");
        assert_eq!(paras.kind, DocumentKind::Wordprocessing);
        assert_eq!(paras.summary(), "1 text elements from 1 paragraphs");
    }

    #[test]
    fn unknown_root_key_is_rejected() {
        assert!(ExtractedDocument::from_json(r#"{"pages":[]}"#).is_err());
        assert!(ExtractedDocument::from_json(r#"{"slides":[{"text":["a"]}]}"#).is_err());
    }

    #[test]
    fn non_ascii_is_written_unescaped() {
        let doc = ExtractedDocument {
            kind: DocumentKind::Presentation,
            units: vec![unit(&["Größe ½"])],
        };
        assert!(doc.to_json_pretty().expect("json").contains("Größe ½"));
    }

    #[test]
    fn iterator_walks_units_without_wraparound() {
        let doc = ExtractedDocument {
            kind: DocumentKind::Presentation,
            units: vec![unit(&["a", "b"]), unit(&["c"])],
        };
        let mut it = TextIterator::new(&doc);
        assert_eq!(it.next_text(), Some("a"));
        // Skip "b": the next unit still starts at its first fragment.
        it.advance_unit();
        assert_eq!(it.next_text(), Some("c"));
        assert_eq!(it.next_text(), None);
        it.advance_unit();
        assert!(it.is_exhausted());
        assert_eq!(it.next_text(), None);
        it.advance_unit();
        assert_eq!(it.next_text(), None);
    }

    #[test]
    fn granularity_parses_case_insensitively() {
        assert_eq!("Aggregate".parse::<Granularity>().expect("parse"), Granularity::Aggregate);
        assert_eq!("run".parse::<Granularity>().expect("parse"), Granularity::Run);
        assert!("word".parse::<Granularity>().is_err());
    }
}
