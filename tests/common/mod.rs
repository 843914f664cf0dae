#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use office_translator::error::BackendError;
use office_translator::transfer::ExtractedDocument;
use office_translator::translate::{Sleeper, TranslationBackend};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const REL_SLIDE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";

pub fn write_package(path: &Path, entries: &[(String, String)]) {
    let f = std::fs::File::create(path).expect("create package");
    let mut zip = ZipWriter::new(f);
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in entries {
        zip.start_file(name.as_str(), opts).expect("start entry");
        zip.write_all(body.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish package");
}

pub fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    let f = std::fs::File::open(path).expect("open package");
    let mut zip = ZipArchive::new(f).expect("read zip");
    let mut entry = zip.by_name(name).expect("entry");
    let mut out = Vec::new();
    entry.read_to_end(&mut out).expect("read entry");
    out
}

pub fn read_entry_string(path: &Path, name: &str) -> String {
    String::from_utf8(read_entry(path, name)).expect("utf8 entry")
}

/// `a:r` with optional bold.
pub fn run(text: &str, bold: bool) -> String {
    let props = if bold { r#"<a:rPr lang="en-US" b="1"/>"# } else { r#"<a:rPr lang="en-US"/>"# };
    format!("<a:r>{props}<a:t>{text}</a:t></a:r>")
}

/// `p:sp` whose text body holds one `a:p` per entry, each made of pre-built inline XML.
pub fn text_shape(id: u32, paragraphs: &[String]) -> String {
    let paras: String = paragraphs
        .iter()
        .map(|p| format!("<a:p>{p}</a:p>"))
        .collect();
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr wrap="square"/><a:lstStyle/>{paras}</p:txBody></p:sp>"#
    )
}

pub fn table_frame(rows: &[&[&str]]) -> String {
    let mut trs = String::new();
    for row in rows {
        trs.push_str(r#"<a:tr h="370840">"#);
        for cell in *row {
            trs.push_str(&format!(
                "<a:tc><a:txBody><a:bodyPr/><a:lstStyle/><a:p>{}</a:p></a:txBody><a:tcPr/></a:tc>",
                run(cell, false)
            ));
        }
        trs.push_str("</a:tr>");
    }
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="90" name="Table"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblPr/><a:tblGrid/>{trs}</a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#
    )
}

pub fn slide_xml(shapes: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#
    )
}

/// A presentation whose slides are listed in reverse file order, so slide order must come
/// from `p:sldIdLst` rather than file names.
pub fn write_pptx(path: &Path, slides: &[String]) {
    let n = slides.len();
    let mut ids = String::new();
    let mut rels = String::new();
    let mut entries = vec![(
        "[Content_Types].xml".to_string(),
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_string(),
    )];
    for (i, body) in slides.iter().enumerate() {
        let file_no = n - i;
        ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, 10 + i));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{REL_SLIDE}" Target="slides/slide{file_no}.xml"/>"#,
            10 + i
        ));
        entries.push((format!("ppt/slides/slide{file_no}.xml"), body.clone()));
    }
    entries.push((
        "ppt/presentation.xml".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="9144000" cy="6858000"/></p:presentation>"#
        ),
    ));
    entries.push((
        "ppt/_rels/presentation.xml.rels".to_string(),
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        ),
    ));
    write_package(path, &entries);
}

/// Single-slide presentation with one text box per entry (one run each).
pub fn write_simple_pptx(path: &Path, texts: &[&str]) {
    let shapes: String = texts
        .iter()
        .enumerate()
        .map(|(i, t)| text_shape(i as u32 + 2, &[run(t, false)]))
        .collect();
    write_pptx(path, &[slide_xml(&shapes)]);
}

pub fn write_docx(path: &Path, body: &str) {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{NS_W}" xmlns:r="{NS_R}"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#
    );
    write_package(
        path,
        &[
            (
                "[Content_Types].xml".to_string(),
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#.to_string(),
            ),
            ("word/document.xml".to_string(), document),
            (
                "word/styles.xml".to_string(),
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles xmlns:w="{NS_W}"/>"#),
            ),
        ],
    );
}

/// Echoes the input JSON of the prompt, with every text passed through `map`.
pub struct MapBackend<F: Fn(&str) -> String> {
    pub map: F,
    pub calls: RefCell<u32>,
}

impl<F: Fn(&str) -> String> MapBackend<F> {
    pub fn new(map: F) -> Self {
        Self {
            map,
            calls: RefCell::new(0),
        }
    }
}

pub fn identity_backend() -> MapBackend<fn(&str) -> String> {
    let same: fn(&str) -> String = |s| s.to_string();
    MapBackend::new(same)
}

pub fn prompt_input(prompt: &str) -> ExtractedDocument {
    let start = prompt.find("Input JSON:\n").expect("input marker") + "Input JSON:\n".len();
    let end = prompt.rfind("\n\nReturn the translated JSON:").expect("end marker");
    ExtractedDocument::from_json(&prompt[start..end]).expect("prompt json")
}

impl<F: Fn(&str) -> String> TranslationBackend for MapBackend<F> {
    fn name(&self) -> &str {
        "map"
    }

    fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        *self.calls.borrow_mut() += 1;
        let mut doc = prompt_input(prompt);
        for unit in &mut doc.units {
            for t in &mut unit.texts {
                *t = (self.map)(t);
            }
        }
        Ok(format!("```json\n{}\n```", doc.to_json_pretty().expect("json")))
    }
}

/// Replies from a fixed script, in order.
pub struct ScriptedBackend {
    replies: RefCell<Vec<Result<String, BackendError>>>,
    pub prompts: RefCell<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(mut replies: Vec<Result<String, BackendError>>) -> Self {
        replies.reverse();
        Self {
            replies: RefCell::new(replies),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl TranslationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| Err(BackendError::Fatal("script exhausted".into())))
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub waits: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}
