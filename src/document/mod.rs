//! Opened `.pptx` / `.docx` documents and their unit layout.

pub mod presentation;
pub mod sites;
pub mod wordprocessing;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::{anyhow, Context};

use crate::ooxml::package::OoxmlPackage;
use crate::ooxml::xml::{write_xml_part, XmlPart};
use crate::transfer::DocumentKind;

pub use sites::{FragmentSite, UnitLayout};

/// Parsed parts that may be edited; tracks which ones were touched.
#[derive(Default)]
pub struct PartSet {
    parts: BTreeMap<String, XmlPart>,
    dirty: BTreeSet<String>,
}

impl PartSet {
    pub fn get(&self, name: &str) -> anyhow::Result<&XmlPart> {
        self.parts
            .get(name)
            .ok_or_else(|| anyhow!("part not loaded: {name}"))
    }

    pub fn get_mut(&mut self, name: &str) -> anyhow::Result<&mut XmlPart> {
        let part = self
            .parts
            .get_mut(name)
            .ok_or_else(|| anyhow!("part not loaded: {name}"))?;
        self.dirty.insert(name.to_string());
        Ok(part)
    }

    fn insert(&mut self, part: XmlPart) {
        self.parts.insert(part.name.clone(), part);
    }
}

pub struct Document {
    kind: DocumentKind,
    package: OoxmlPackage,
    parts: PartSet,
    units: Vec<UnitLayout>,
}

impl Document {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let package = OoxmlPackage::read(path)?;
        let kind = match DocumentKind::from_path(path) {
            Some(kind) => kind,
            None => detect_kind(&package)
                .with_context(|| format!("unsupported document type: {}", path.display()))?,
        };

        let mut parts = PartSet::default();
        let mut units = Vec::new();
        match kind {
            DocumentKind::Presentation => {
                for name in presentation::slide_parts(&package)
                    .with_context(|| format!("read slide list: {}", path.display()))?
                {
                    let part = package.xml_part(&name)?;
                    let frames = presentation::slide_frames(&part)
                        .with_context(|| format!("walk slide: {name}"))?;
                    units.push(UnitLayout {
                        part: name,
                        frames,
                    });
                    parts.insert(part);
                }
            }
            DocumentKind::Wordprocessing => {
                let part = package.xml_part(wordprocessing::DOCUMENT_PART)?;
                let frames = wordprocessing::paragraph_frames(&part)?;
                units.extend(frames.into_iter().map(|frame| UnitLayout {
                    part: wordprocessing::DOCUMENT_PART.to_string(),
                    frames: vec![frame],
                }));
                parts.insert(part);
            }
        }
        log::debug!(
            "opened {} ({:?}, {} units)",
            path.display(),
            kind,
            units.len()
        );

        Ok(Self {
            kind,
            package,
            parts,
            units,
        })
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn units(&self) -> &[UnitLayout] {
        &self.units
    }

    pub fn parts(&self) -> &PartSet {
        &self.parts
    }

    /// Layout and editable parts at once, for callers that write while walking units.
    pub fn units_and_parts_mut(&mut self) -> (&[UnitLayout], &mut PartSet) {
        (&self.units, &mut self.parts)
    }

    /// Writes the package to `path`. Only edited parts are re-serialized; each must still
    /// match its parse-time structure.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
        for name in &self.parts.dirty {
            let part = self.parts.get(name)?;
            part.verify_structure_unchanged()?;
            replacements.insert(name.clone(), write_xml_part(part)?);
        }
        self.package
            .write_with_replacements(path, &replacements)
            .with_context(|| format!("save document: {}", path.display()))
    }
}

fn detect_kind(pkg: &OoxmlPackage) -> Option<DocumentKind> {
    if pkg.has_entry("ppt/presentation.xml") {
        Some(DocumentKind::Presentation)
    } else if pkg.has_entry(wordprocessing::DOCUMENT_PART) {
        Some(DocumentKind::Wordprocessing)
    } else {
        None
    }
}
