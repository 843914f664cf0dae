//! Text locations inside a parsed part, shared by extraction and reintegration.
//!
//! Both directions plan the same [`FragmentSite`] list for a unit, so the n-th extracted text
//! is always written back to the n-th site.

use anyhow::anyhow;

use crate::ooxml::tree::Element;
use crate::ooxml::xml::XmlPart;
use crate::transfer::Granularity;

/// One text event inside a `a:t` / `w:t` element.
#[derive(Clone, Debug)]
pub struct TextSlot {
    pub element: usize,
    pub text: usize,
    /// `w:t` needs `xml:space="preserve"` to keep edge whitespace.
    pub preserve_space: bool,
}

/// Child of a run in document order. `w:tab` reads as `\t`; `w:br` and `w:cr` read as `\n`.
#[derive(Clone, Debug)]
pub enum RunPiece {
    Text(TextSlot),
    Tab,
    Break,
}

impl RunPiece {
    fn mark(&self) -> Option<char> {
        match self {
            Self::Text(_) => None,
            Self::Tab => Some('\t'),
            Self::Break => Some('\n'),
        }
    }
}

/// A formatting run (`a:r`, `a:fld`, `w:r`) and its text slots.
#[derive(Clone, Debug, Default)]
pub struct RunSite {
    pub pieces: Vec<RunPiece>,
}

impl RunSite {
    pub fn from_element(run: &Element, preserve_space: bool) -> Self {
        let mut pieces = Vec::new();
        for child in run.elements() {
            match child.local() {
                "t" => pieces.extend(child.text_events().map(|text| {
                    RunPiece::Text(TextSlot {
                        element: child.event_index,
                        text,
                        preserve_space,
                    })
                })),
                "tab" => pieces.push(RunPiece::Tab),
                "br" | "cr" => pieces.push(RunPiece::Break),
                _ => {}
            }
        }
        Self { pieces }
    }

    pub fn slots(&self) -> impl Iterator<Item = &TextSlot> {
        self.pieces.iter().filter_map(|p| match p {
            RunPiece::Text(slot) => Some(slot),
            _ => None,
        })
    }

    pub fn text(&self, part: &XmlPart) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                RunPiece::Text(slot) => out.push_str(part.text_at(slot.text).unwrap_or("")),
                other => out.extend(other.mark()),
            }
        }
        out
    }

    /// Puts `value` into the first slot and empties the others. When the run holds tabs or
    /// breaks and `value` carries the same sequence of `\t` / `\n`, each piece goes into the
    /// text between the matching marks instead.
    pub fn write(&self, part: &mut XmlPart, value: &str) -> anyhow::Result<()> {
        let marks: Vec<char> = self.pieces.iter().filter_map(RunPiece::mark).collect();
        let value_marks: Vec<char> = value.chars().filter(|c| matches!(c, '\t' | '\n')).collect();
        if !marks.is_empty() && marks == value_marks {
            let mut groups: Vec<Vec<TextSlot>> = vec![Vec::new()];
            for piece in &self.pieces {
                match piece {
                    RunPiece::Text(slot) => {
                        if let Some(group) = groups.last_mut() {
                            group.push(slot.clone());
                        }
                    }
                    _ => groups.push(Vec::new()),
                }
            }
            let chunks: Vec<&str> = value.split(['\t', '\n']).collect();
            let fits = groups
                .iter()
                .zip(&chunks)
                .all(|(group, chunk)| !group.is_empty() || chunk.is_empty());
            if fits {
                for (group, chunk) in groups.iter().zip(chunks) {
                    if !group.is_empty() {
                        write_slots(part, group, chunk)?;
                    }
                }
                return Ok(());
            }
        }

        // Line breaks only exist as elements; never put one inside a text node.
        let flat = value.replace('\n', " ");
        let slots: Vec<TextSlot> = self.slots().cloned().collect();
        if slots.is_empty() {
            if !flat.trim().is_empty() {
                log::warn!("run in {} has no text node, dropping {flat:?}", part.name);
            }
            return Ok(());
        }
        write_slots(part, &slots, &flat)
    }
}

fn write_slots(part: &mut XmlPart, slots: &[TextSlot], value: &str) -> anyhow::Result<()> {
    let Some((first, rest)) = slots.split_first() else {
        return Err(anyhow!("no text node to write in {}", part.name));
    };
    write_slot(part, first, value)?;
    for slot in rest {
        write_slot(part, slot, "")?;
    }
    Ok(())
}

fn write_slot(part: &mut XmlPart, slot: &TextSlot, value: &str) -> anyhow::Result<()> {
    part.set_text(slot.text, value)?;
    if slot.preserve_space && value.trim() != value {
        part.set_attr(slot.element, "xml:space", "preserve")?;
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub enum Inline {
    Run(RunSite),
    /// Field such as a slide number. Its text is read but never rewritten.
    Field(RunSite),
    Break,
}

#[derive(Clone, Debug, Default)]
pub struct ParagraphSite {
    pub inlines: Vec<Inline>,
}

impl ParagraphSite {
    pub fn runs(&self) -> impl Iterator<Item = &RunSite> {
        self.inlines.iter().filter_map(|i| match i {
            Inline::Run(r) => Some(r),
            _ => None,
        })
    }

    pub fn text(&self, part: &XmlPart) -> String {
        let mut out = String::new();
        for inline in &self.inlines {
            match inline {
                Inline::Run(r) | Inline::Field(r) => out.push_str(&r.text(part)),
                Inline::Break => out.push('\n'),
            }
        }
        out
    }
}

/// Line of a frame: a paragraph, or the part of one between two `a:br`.
#[derive(Default)]
struct Segment<'a> {
    inlines: Vec<&'a Inline>,
}

impl Segment<'_> {
    fn text(&self, part: &XmlPart) -> String {
        self.inlines
            .iter()
            .filter_map(|i| match i {
                Inline::Run(r) | Inline::Field(r) => Some(r.text(part)),
                Inline::Break => None,
            })
            .collect()
    }
}

/// A text frame, table cell or (docx) paragraph: the unit of aggregate extraction.
#[derive(Clone, Debug, Default)]
pub struct FrameSite {
    pub paragraphs: Vec<ParagraphSite>,
}

impl FrameSite {
    pub fn runs(&self) -> impl Iterator<Item = &RunSite> {
        self.paragraphs.iter().flat_map(|p| p.runs())
    }

    fn segments(&self) -> Vec<Segment<'_>> {
        let mut out = Vec::new();
        for paragraph in &self.paragraphs {
            let mut current = Segment::default();
            for inline in &paragraph.inlines {
                match inline {
                    Inline::Break => out.push(std::mem::take(&mut current)),
                    other => current.inlines.push(other),
                }
            }
            out.push(current);
        }
        out
    }

    /// Segment texts from the first to the last non-blank one, joined by `\n`.
    fn active_text(&self, part: &XmlPart) -> (Vec<Segment<'_>>, String) {
        let mut segments = self.segments();
        let texts: Vec<String> = segments.iter().map(|s| s.text(part)).collect();
        let first = texts.iter().position(|t| !t.trim().is_empty());
        let last = texts.iter().rposition(|t| !t.trim().is_empty());
        match (first, last) {
            (Some(first), Some(last)) => {
                segments.truncate(last + 1);
                segments.drain(..first);
                (segments, texts[first..=last].join("\n"))
            }
            _ => (Vec::new(), String::new()),
        }
    }

    /// Paragraph texts joined by newlines, trimmed.
    pub fn text(&self, part: &XmlPart) -> String {
        self.active_text(part).1.trim().to_string()
    }

    /// Writes `value` back line by line when it has as many lines as the frame, each line
    /// spread over the runs of its segment in proportion to their original lengths. A value
    /// with a different line count is joined with spaces and spread over the whole frame.
    /// Field text is kept in place and not handed to the runs. Frames whose text comes only
    /// from fields get the whole value in their first text node.
    pub fn write(&self, part: &mut XmlPart, value: &str) -> anyhow::Result<()> {
        if self.runs().all(|r| r.text(part).is_empty()) {
            let slots: Vec<TextSlot> = self
                .paragraphs
                .iter()
                .flat_map(|p| p.inlines.iter())
                .filter_map(|i| match i {
                    Inline::Run(r) | Inline::Field(r) => Some(r.slots().cloned()),
                    Inline::Break => None,
                })
                .flatten()
                .collect();
            return write_slots(part, &slots, value);
        }

        let (segments, original) = self.active_text(part);
        if segments.is_empty() {
            return Ok(());
        }
        let value = restore_edges(value, &original);

        if segments.len() == 1 {
            return write_segment(part, &segments[0].inlines, &value);
        }
        let lines: Vec<&str> = value.split('\n').collect();
        if lines.len() == segments.len() {
            for (segment, line) in segments.iter().zip(lines) {
                write_segment(part, &segment.inlines, line)?;
            }
            return Ok(());
        }

        log::debug!(
            "{}: {} lines for {} frame lines, joining",
            part.name,
            lines.len(),
            segments.len()
        );
        let joined = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let merged: Vec<&Inline> = segments
            .iter()
            .flat_map(|s| s.inlines.iter().copied())
            .collect();
        write_segment(part, &merged, &joined)
    }
}

/// Puts back the edge whitespace `text` dropped when it was trimmed for extraction.
fn restore_edges(value: &str, original: &str) -> String {
    let lead = &original[..original.len() - original.trim_start().len()];
    let trail = &original[original.trim_end().len()..];
    let mut out = String::with_capacity(lead.len() + value.len() + trail.len());
    if value.trim_start() == value {
        out.push_str(lead);
    }
    out.push_str(value);
    if value.trim_end() == value {
        out.push_str(trail);
    }
    out
}

/// Removes each field's text (last occurrence) so only run text is redistributed.
fn reserve_fields(value: &str, fields: &[String]) -> String {
    let mut out = value.to_string();
    for field in fields.iter().rev().filter(|f| !f.is_empty()) {
        if let Some(pos) = out.rfind(field.as_str()) {
            out.replace_range(pos..pos + field.len(), "");
        }
    }
    out
}

fn write_segment(part: &mut XmlPart, inlines: &[&Inline], value: &str) -> anyhow::Result<()> {
    let mut runs = Vec::new();
    let mut weights = Vec::new();
    let mut fields = Vec::new();
    for inline in inlines {
        match inline {
            Inline::Run(run) => {
                let len = run.text(part).chars().count();
                if len > 0 {
                    runs.push(run);
                    weights.push(len);
                }
            }
            Inline::Field(field) => fields.push(field.text(part)),
            Inline::Break => {}
        }
    }

    let remainder = reserve_fields(value, &fields);
    if runs.is_empty() {
        if remainder.trim().is_empty() {
            return Ok(());
        }
        let slots: Vec<TextSlot> = inlines
            .iter()
            .filter_map(|i| match i {
                Inline::Run(r) | Inline::Field(r) => Some(r.slots().cloned()),
                Inline::Break => None,
            })
            .flatten()
            .collect();
        if slots.is_empty() {
            log::warn!("no text node left for {value:?} in {}", part.name);
            return Ok(());
        }
        return write_slots(part, &slots, value);
    }

    let shares = distribute_by_length(&remainder, &weights);
    for (run, share) in runs.into_iter().zip(shares) {
        run.write(part, &share)?;
    }
    Ok(())
}

/// Structural layout of one unit (slide or docx paragraph).
#[derive(Clone, Debug)]
pub struct UnitLayout {
    pub part: String,
    pub frames: Vec<FrameSite>,
}

#[derive(Clone, Copy, Debug)]
pub enum FragmentSite<'a> {
    Run(&'a RunSite),
    Frame(&'a FrameSite),
}

impl FragmentSite<'_> {
    pub fn text(&self, part: &XmlPart) -> String {
        match self {
            Self::Run(r) => r.text(part),
            Self::Frame(f) => f.text(part),
        }
    }

    pub fn write(&self, part: &mut XmlPart, value: &str) -> anyhow::Result<()> {
        match self {
            Self::Run(r) => r.write(part, value),
            Self::Frame(f) => f.write(part, value),
        }
    }
}

impl UnitLayout {
    /// Sites whose current text is non-empty (trimmed, for frames), in document order.
    pub fn fragment_sites(&self, part: &XmlPart, granularity: Granularity) -> Vec<FragmentSite<'_>> {
        match granularity {
            Granularity::Run => self
                .frames
                .iter()
                .flat_map(|f| f.runs())
                .filter(|r| !r.text(part).is_empty())
                .map(FragmentSite::Run)
                .collect(),
            Granularity::Aggregate => self
                .frames
                .iter()
                .filter(|f| !f.text(part).is_empty())
                .map(FragmentSite::Frame)
                .collect(),
        }
    }
}

/// Splits `text` into one chunk per weight. Each run but the last takes
/// `round(len * w / sum)` characters (at least one while text remains); the last takes
/// the rest. Counts are in characters, never bytes.
pub fn distribute_by_length(text: &str, weights: &[usize]) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let n = weights.len();
    let sum: usize = weights.iter().sum();

    let mut out = Vec::with_capacity(n);
    let mut pos = 0usize;
    for (i, &w) in weights.iter().enumerate() {
        let remaining = total - pos;
        let take = if i + 1 == n {
            remaining
        } else {
            let mut share = if sum == 0 {
                (2 * total + n) / (2 * n)
            } else {
                (2 * total * w + sum) / (2 * sum)
            };
            if share == 0 && remaining > 0 {
                share = 1;
            }
            share.min(remaining)
        };
        out.push(chars[pos..pos + take].iter().collect());
        pos += take;
    }
    out
}
