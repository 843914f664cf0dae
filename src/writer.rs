use anyhow::anyhow;

use crate::document::Document;
use crate::transfer::{ExtractedDocument, Granularity, TextIterator};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReintegrationReport {
    /// Sites that received a translated fragment.
    pub replaced: usize,
    /// Sites found in the document.
    pub expected: usize,
}

/// Writes `translated` back into `doc`, site by site, in the order [`crate::walker::extract`]
/// produced them. Sites with no fragment left in their unit keep their original text.
pub fn reintegrate(
    doc: &mut Document,
    translated: &ExtractedDocument,
    granularity: Granularity,
) -> anyhow::Result<ReintegrationReport> {
    if translated.kind != doc.kind() {
        return Err(anyhow!(
            "transfer json holds {}s but the document is made of {}s",
            translated.kind.unit_label(),
            doc.kind().unit_label()
        ));
    }

    let mut report = ReintegrationReport::default();
    let mut texts = TextIterator::new(translated);
    let (units, parts) = doc.units_and_parts_mut();
    for (idx, unit) in units.iter().enumerate() {
        let sites = unit.fragment_sites(parts.get(&unit.part)?, granularity);
        report.expected += sites.len();
        if sites.is_empty() {
            texts.advance_unit();
            continue;
        }
        let part = parts.get_mut(&unit.part)?;
        for site in &sites {
            match texts.next_text() {
                Some(value) => {
                    site.write(part, value)?;
                    report.replaced += 1;
                }
                None => {
                    log::warn!(
                        "{} {}: no translated text left, keeping original",
                        translated.kind.unit_label(),
                        idx + 1
                    );
                    break;
                }
            }
        }
        texts.advance_unit();
    }
    Ok(report)
}
