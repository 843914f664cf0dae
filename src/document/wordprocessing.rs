use anyhow::Context;

use crate::ooxml::tree::{build_tree, Element};
use crate::ooxml::xml::XmlPart;

use super::sites::{FrameSite, Inline, ParagraphSite, RunSite};

pub const DOCUMENT_PART: &str = "word/document.xml";

/// One frame per paragraph: body paragraphs first, then the paragraphs of each top-level
/// table, row by row and cell by cell.
pub fn paragraph_frames(part: &XmlPart) -> anyhow::Result<Vec<FrameSite>> {
    let root = build_tree(part)?;
    let body = root
        .child("body")
        .with_context(|| format!("missing w:body in {}", part.name))?;

    let mut frames: Vec<FrameSite> = body.children_named("p").map(paragraph_frame).collect();
    for tbl in body.children_named("tbl") {
        for tr in tbl.children_named("tr") {
            for tc in tr.children_named("tc") {
                frames.extend(tc.children_named("p").map(paragraph_frame));
            }
        }
    }
    Ok(frames)
}

fn paragraph_frame(p: &Element) -> FrameSite {
    let mut inlines = Vec::new();
    for child in p.elements() {
        match child.local() {
            "r" => inlines.push(Inline::Run(RunSite::from_element(child, true))),
            "hyperlink" => inlines.extend(
                child
                    .children_named("r")
                    .map(|r| Inline::Run(RunSite::from_element(r, true))),
            ),
            _ => {}
        }
    }
    FrameSite {
        paragraphs: vec![ParagraphSite { inlines }],
    }
}

#[cfg(test)]
mod tests {
    use super::paragraph_frames;
    use crate::ooxml::xml::{parse_xml_part, write_xml_part};

    const DOC: &str = r#"<w:document xmlns:w="w"><w:body>
<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r><w:r><w:t xml:space="preserve"> and </w:t></w:r><w:hyperlink><w:r><w:t>link</w:t></w:r></w:hyperlink></w:p>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:p/>
<w:p><w:r><w:t>Split</w:t><w:t>Text</w:t></w:r></w:p>
<w:sectPr/>
</w:body></w:document>"#;

    #[test]
    fn body_paragraphs_come_before_table_cells() {
        let part = parse_xml_part("word/document.xml", DOC.as_bytes()).expect("parse");
        let frames = paragraph_frames(&part).expect("frames");
        let texts: Vec<String> = frames.iter().map(|f| f.text(&part)).collect();
        assert_eq!(texts, vec!["Bold and link", "", "SplitText", "Cell"]);
    }

    #[test]
    fn run_writes_fill_first_text_and_keep_spaces() {
        let mut part = parse_xml_part("word/document.xml", DOC.as_bytes()).expect("parse");
        let frames = paragraph_frames(&part).expect("frames");
        let split = frames[2].runs().next().expect("run").clone();
        split.write(&mut part, " Geteilt ").expect("write");
        part.verify_structure_unchanged().expect("structure");

        let s = String::from_utf8(write_xml_part(&part).expect("write")).expect("utf8");
        assert!(s.contains(r#"<w:t xml:space="preserve"> Geteilt </w:t><w:t></w:t>"#));
    }

    const TABS: &str = r#"<w:document xmlns:w="w"><w:body>
<w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t></w:r><w:r><w:tab/></w:r></w:p>
<w:p><w:r><w:t>Line</w:t><w:br/><w:t>Two</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn tabs_and_breaks_read_as_characters() {
        let part = parse_xml_part("word/document.xml", TABS.as_bytes()).expect("parse");
        let frames = paragraph_frames(&part).expect("frames");
        let runs: Vec<String> = frames[0].runs().map(|r| r.text(&part)).collect();
        assert_eq!(runs, vec!["A\tB", "\t"]);
        assert_eq!(frames[1].text(&part), "Line\nTwo");
    }

    #[test]
    fn text_around_tabs_is_written_between_them() {
        let mut part = parse_xml_part("word/document.xml", TABS.as_bytes()).expect("parse");
        let frames = paragraph_frames(&part).expect("frames");
        let run = frames[0].runs().next().expect("run").clone();

        run.write(&mut part, "X\tY").expect("write");
        assert_eq!(run.text(&part), "X\tY");

        // No tab in the value: everything lands before the tab element.
        run.write(&mut part, "XY").expect("write");
        assert_eq!(run.text(&part), "XY\t");
        part.verify_structure_unchanged().expect("structure");
    }

    #[test]
    fn paragraph_with_line_break_survives_aggregate_rewrite() {
        let mut part = parse_xml_part("word/document.xml", TABS.as_bytes()).expect("parse");
        let frames = paragraph_frames(&part).expect("frames");
        for frame in &frames {
            let before = frame.text(&part);
            frame.write(&mut part, &before).expect("write");
            assert_eq!(frame.text(&part), before);
        }
        frames[1].write(&mut part, "Zeile\nZwei").expect("write");
        assert_eq!(frames[1].text(&part), "Zeile\nZwei");
    }
}
