use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::xml::{find_attr, local_name, parse_xml_part, XmlEvent, XmlPart};

/// An OOXML package (`.pptx`, `.docx`) held fully in memory.
///
/// Entries keep their original compression and timestamps so that untouched parts are
/// written back byte-for-byte.
pub struct OoxmlPackage {
    pub entries: Vec<PackageEntry>,
}

pub struct PackageEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl OoxmlPackage {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open package: {}", path.display()))?;
        let mut zip = ZipArchive::new(f)
            .with_context(|| format!("read zip: {}", path.display()))?;
        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {}", file.name()))?;
            entries.push(PackageEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    /// Writes the package to `output_path`, substituting `replacements` by entry name. The
    /// zip is built in a temporary file beside the target and renamed into place, so a failed
    /// write never leaves a partial package behind.
    pub fn write_with_replacements(
        &self,
        output_path: &Path,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<()> {
        let dir = match output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => dir,
            None => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir: {}", dir.display()))?;
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("create temp package in {}", dir.display()))?;

        let mut zout = ZipWriter::new(tmp);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        let tmp = zout.finish().context("finish zip")?;
        tmp.persist(output_path)
            .with_context(|| format!("move package into place: {}", output_path.display()))?;
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn xml_part(&self, name: &str) -> anyhow::Result<XmlPart> {
        let ent = self
            .entry(name)
            .ok_or_else(|| anyhow!("missing package part: {name}"))?;
        parse_xml_part(name, &ent.data).with_context(|| format!("parse xml: {name}"))
    }

    /// Relationships declared by `part_name` (its `_rels/<file>.rels` sibling). A part
    /// without a relationships entry has none.
    pub fn relationships(&self, part_name: &str) -> anyhow::Result<Vec<Relationship>> {
        let rels_name = rels_part_name(part_name);
        if !self.has_entry(&rels_name) {
            return Ok(Vec::new());
        }
        let part = self.xml_part(&rels_name)?;
        let mut out = Vec::new();
        for ev in &part.events {
            let (XmlEvent::Start { name, attrs } | XmlEvent::Empty { name, attrs }) = ev else {
                continue;
            };
            if local_name(name) != "Relationship" {
                continue;
            }
            let id = find_attr(attrs, "Id").unwrap_or_default().to_string();
            let target = find_attr(attrs, "Target").unwrap_or_default().to_string();
            if id.is_empty() || target.is_empty() {
                continue;
            }
            out.push(Relationship {
                id,
                rel_type: find_attr(attrs, "Type").unwrap_or_default().to_string(),
                target,
                external: find_attr(attrs, "TargetMode") == Some("External"),
            });
        }
        Ok(out)
    }
}

fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against the part that declares it.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}
