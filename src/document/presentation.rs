use anyhow::Context;

use crate::ooxml::package::{resolve_target, OoxmlPackage};
use crate::ooxml::tree::{build_tree, Element};
use crate::ooxml::xml::{local_name, XmlPart};

use super::sites::{FrameSite, Inline, ParagraphSite, RunSite};

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const SLIDE_REL_SUFFIX: &str = "/relationships/slide";

/// Slide part names in presentation order (`p:sldIdLst`). Falls back to the slide
/// relationships sorted by slide number when the list is missing.
pub fn slide_parts(pkg: &OoxmlPackage) -> anyhow::Result<Vec<String>> {
    let rels = pkg.relationships(PRESENTATION_PART)?;
    let pres = pkg.xml_part(PRESENTATION_PART)?;
    let root = build_tree(&pres)?;

    let mut out = Vec::new();
    if let Some(list) = root.child("sldIdLst") {
        for sld in list.children_named("sldId") {
            let Some(rid) = relationship_id(&pres, sld) else {
                continue;
            };
            let rel = rels
                .iter()
                .find(|r| r.id == rid)
                .with_context(|| format!("slide relationship {rid} not found"))?;
            out.push(resolve_target(PRESENTATION_PART, &rel.target));
        }
        return Ok(out);
    }

    let mut numbered: Vec<(u32, String)> = rels
        .iter()
        .filter(|r| !r.external && r.rel_type.ends_with(SLIDE_REL_SUFFIX))
        .map(|r| {
            let name = resolve_target(PRESENTATION_PART, &r.target);
            (slide_number(&name), name)
        })
        .collect();
    numbered.sort();
    out.extend(numbered.into_iter().map(|(_, name)| name));
    Ok(out)
}

fn relationship_id(part: &XmlPart, el: &Element) -> Option<String> {
    part.attrs(el.event_index)
        .iter()
        .find(|(k, _)| k.contains(':') && local_name(k) == "id")
        .map(|(_, v)| v.clone())
}

fn slide_number(name: &str) -> u32 {
    let stem = name.rsplit('/').next().unwrap_or(name);
    let digits: String = stem.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(u32::MAX)
}

/// Text frames of one slide in shape-tree order: plain shapes, group members (recursively)
/// and table cells row by row. Pictures and connectors carry no text frame.
pub fn slide_frames(part: &XmlPart) -> anyhow::Result<Vec<FrameSite>> {
    let root = build_tree(part)?;
    let mut frames = Vec::new();
    if let Some(tree) = root.path(&["cSld", "spTree"]) {
        collect_shapes(tree, &mut frames);
    }
    Ok(frames)
}

fn collect_shapes(container: &Element, frames: &mut Vec<FrameSite>) {
    for shape in container.elements() {
        match shape.local() {
            "sp" => {
                if let Some(body) = shape.child("txBody") {
                    frames.push(text_frame(body));
                }
            }
            "grpSp" => collect_shapes(shape, frames),
            "graphicFrame" => {
                let Some(tbl) = shape.path(&["graphic", "graphicData", "tbl"]) else {
                    continue;
                };
                for tr in tbl.children_named("tr") {
                    for tc in tr.children_named("tc") {
                        if let Some(body) = tc.child("txBody") {
                            frames.push(text_frame(body));
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn text_frame(body: &Element) -> FrameSite {
    FrameSite {
        paragraphs: body.children_named("p").map(paragraph).collect(),
    }
}

fn paragraph(p: &Element) -> ParagraphSite {
    let inlines = p
        .elements()
        .filter_map(|child| match child.local() {
            "r" => Some(Inline::Run(RunSite::from_element(child, false))),
            "fld" => Some(Inline::Field(RunSite::from_element(child, false))),
            "br" => Some(Inline::Break),
            _ => None,
        })
        .collect();
    ParagraphSite { inlines }
}
