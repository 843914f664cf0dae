use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

/// Lossless event view of one XML part. Element and attribute names keep their prefixes
/// (`a:t`, `w:r`, ...); attribute values keep their raw escaped bytes.
#[derive(Clone, Debug)]
pub enum XmlEvent {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    /// Unescaped character data.
    Text { text: String },
    /// Declaration, comment, CDATA, processing instruction or doctype, delimiters included.
    Markup { raw: String },
}

#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub events: Vec<XmlEvent>,
    /// Fingerprint of everything except run text, taken at parse time.
    pub baseline_hash: String,
}

impl XmlPart {
    pub fn text_at(&self, event_index: usize) -> Option<&str> {
        match self.events.get(event_index) {
            Some(XmlEvent::Text { text }) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn attrs(&self, event_index: usize) -> &[(String, String)] {
        match self.events.get(event_index) {
            Some(XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. }) => attrs,
            _ => &[],
        }
    }

    pub fn set_text(&mut self, event_index: usize, value: &str) -> anyhow::Result<()> {
        match self.events.get_mut(event_index) {
            Some(XmlEvent::Text { text }) => {
                *text = value.to_string();
                Ok(())
            }
            _ => Err(anyhow!(
                "expected text event at {} in {}",
                event_index,
                self.name
            )),
        }
    }

    pub fn set_attr(&mut self, event_index: usize, key: &str, value: &str) -> anyhow::Result<()> {
        let ev = self
            .events
            .get_mut(event_index)
            .with_context(|| format!("element index {event_index} out of range in {}", self.name))?;
        match ev {
            XmlEvent::Start { attrs, .. } | XmlEvent::Empty { attrs, .. } => {
                match attrs.iter_mut().find(|(k, _)| k == key) {
                    Some((_, v)) => *v = value.to_string(),
                    None => attrs.push((key.to_string(), value.to_string())),
                }
                Ok(())
            }
            _ => Err(anyhow!(
                "expected element at {} in {}",
                event_index,
                self.name
            )),
        }
    }

    /// Fails when anything other than run text (or `xml:space`) changed since parsing.
    pub fn verify_structure_unchanged(&self) -> anyhow::Result<()> {
        let cur = structure_hash(&self.events);
        if cur != self.baseline_hash {
            return Err(anyhow!(
                "non-text structure changed in {} (baseline={} current={})",
                self.name,
                self.baseline_hash,
                cur
            ));
        }
        Ok(())
    }
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut events: Vec<XmlEvent> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let ev = reader.read_event_into(&mut buf).context("read xml event")?;
        let event = match ev {
            Event::Eof => break,
            Event::Start(s) => XmlEvent::Start {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            },
            Event::End(e) => XmlEvent::End {
                name: bytes_to_string(e.name().as_ref()),
            },
            Event::Empty(s) => XmlEvent::Empty {
                name: bytes_to_string(s.name().as_ref()),
                attrs: collect_attrs(&s)?,
            },
            Event::Text(t) => XmlEvent::Text {
                text: t.unescape().context("unescape text")?.into_owned(),
            },
            Event::Decl(d) => markup("<?", &d, "?>"),
            Event::PI(p) => markup("<?", &p, "?>"),
            Event::CData(c) => markup("<![CDATA[", &c, "]]>"),
            Event::Comment(c) => markup("<!--", &c, "-->"),
            Event::DocType(d) => markup("<!DOCTYPE", &d, ">"),
        };
        events.push(event);
    }

    let baseline_hash = structure_hash(&events);
    Ok(XmlPart {
        name: name.to_string(),
        events,
        baseline_hash,
    })
}

fn markup(open: &str, inner: &[u8], close: &str) -> XmlEvent {
    XmlEvent::Markup {
        raw: format!("{open}{}{close}", String::from_utf8_lossy(inner)),
    }
}

fn collect_attrs(s: &BytesStart<'_>) -> anyhow::Result<Vec<(String, String)>> {
    s.attributes()
        .map(|a| {
            let a = a.context("attr")?;
            // Raw bytes: character references such as `&#13;` must survive untouched.
            Ok((bytes_to_string(a.key.as_ref()), bytes_to_string(a.value.as_ref())))
        })
        .collect()
}

fn bytes_to_string(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

pub fn write_xml_part(part: &XmlPart) -> anyhow::Result<Vec<u8>> {
    let mut out = String::new();
    for ev in &part.events {
        match ev {
            XmlEvent::Start { name, attrs } => push_tag(&mut out, name, attrs, false),
            XmlEvent::Empty { name, attrs } => push_tag(&mut out, name, attrs, true),
            XmlEvent::End { name } => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            XmlEvent::Text { text } => {
                for ch in text.chars() {
                    match ch {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        _ => out.push(ch),
                    }
                }
            }
            XmlEvent::Markup { raw } => out.push_str(raw),
        }
    }
    Ok(out.into_bytes())
}

fn push_tag(out: &mut String, name: &str, attrs: &[(String, String)], empty: bool) {
    out.push('<');
    out.push_str(name);
    for (k, v) in attrs {
        out.push_str(&format!(" {k}=\"{v}\""));
    }
    out.push_str(if empty { "/>" } else { ">" });
}

pub fn find_attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// `a:t` -> `t`
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

fn is_text_tag(name: &str) -> bool {
    matches!(name, "w:t" | "a:t")
}

/// Sha256 over the event stream, skipping text inside `a:t` / `w:t` and the `xml:space`
/// attribute the writer may toggle.
fn structure_hash(events: &[XmlEvent]) -> String {
    let mut hasher = Sha256::new();
    let mut open: Vec<&str> = Vec::new();
    let mut feed = |tag: &str, body: &str| {
        hasher.update(tag.as_bytes());
        hasher.update(body.as_bytes());
        hasher.update(b"\n");
    };

    for ev in events {
        match ev {
            XmlEvent::Start { name, attrs } => {
                open.push(name.as_str());
                feed("S:", &tag_key(name, attrs));
            }
            XmlEvent::Empty { name, attrs } => {
                feed("S:", &tag_key(name, attrs));
                feed("E:", name);
            }
            XmlEvent::End { name } => {
                feed("E:", name);
                open.pop();
            }
            XmlEvent::Text { text } => {
                if !open.last().is_some_and(|cur| is_text_tag(cur)) {
                    feed("T:", text);
                }
            }
            XmlEvent::Markup { raw } => feed("M:", raw),
        }
    }
    hex::encode(hasher.finalize())
}

fn tag_key(name: &str, attrs: &[(String, String)]) -> String {
    let sorted: BTreeMap<&str, &str> = attrs
        .iter()
        .filter(|(k, _)| k != "xml:space")
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut key = format!("{name}|");
    for (k, v) in sorted {
        key.push_str(&format!("{k}={v};"));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::{local_name, parse_xml_part, write_xml_part, XmlEvent};

    #[test]
    fn write_preserves_attr_entity_refs() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let part = parse_xml_part("test.xml", xml).expect("parse xml");
        let out = write_xml_part(&part).expect("write xml");
        let s = String::from_utf8(out).expect("utf8");

        assert!(s.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!s.contains(r#"o:gfxdata="A&amp;#xD;"#));
    }

    #[test]
    fn run_text_edits_keep_structure_fingerprint() {
        let xml = br#"<a:p><a:r><a:rPr b="1"/><a:t>Fish &amp; chips</a:t></a:r></a:p>"#;
        let mut part = parse_xml_part("slide.xml", xml).expect("parse xml");
        let idx = part
            .events
            .iter()
            .position(|e| matches!(e, XmlEvent::Text { .. }))
            .expect("text event");
        assert_eq!(part.text_at(idx), Some("Fish & chips"));

        part.set_text(idx, " Pescado <frito> ").expect("set text");
        part.set_attr(idx - 1, "xml:space", "preserve").expect("set attr");
        part.verify_structure_unchanged().expect("structure unchanged");

        let s = String::from_utf8(write_xml_part(&part).expect("write")).expect("utf8");
        assert!(s.contains("<a:t xml:space=\"preserve\"> Pescado &lt;frito&gt; </a:t>"));
    }

    #[test]
    fn attribute_edits_break_structure_fingerprint() {
        let xml = br#"<a:p><a:r><a:rPr b="1"/><a:t>x</a:t></a:r></a:p>"#;
        let mut part = parse_xml_part("slide.xml", xml).expect("parse xml");
        part.set_attr(2, "b", "0").expect("set attr");
        assert!(part.verify_structure_unchanged().is_err());
    }

    #[test]
    fn prolog_comments_and_cdata_are_written_back_verbatim() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<!-- kept --><w:body><![CDATA[a < b]]><?mso-application progid=\"Word.Document\"?></w:body>";
        let part = parse_xml_part("doc.xml", xml.as_bytes()).expect("parse xml");
        let out = String::from_utf8(write_xml_part(&part).expect("write")).expect("utf8");
        assert_eq!(out, xml);
    }

    #[test]
    fn local_name_drops_prefix() {
        assert_eq!(local_name("p:txBody"), "txBody");
        assert_eq!(local_name("Relationship"), "Relationship");
    }
}
