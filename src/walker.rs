use crate::document::Document;
use crate::transfer::{ExtractedDocument, Granularity, Unit};

/// Collects every non-empty fragment, one [`Unit`] per slide or paragraph. Units without
/// text are kept (with an empty list) so unit positions line up with the document.
pub fn extract(doc: &Document, granularity: Granularity) -> anyhow::Result<ExtractedDocument> {
    let mut out = ExtractedDocument::new(doc.kind());
    for unit in doc.units() {
        let part = doc.parts().get(&unit.part)?;
        let texts = unit
            .fragment_sites(part, granularity)
            .iter()
            .map(|site| site.text(part))
            .collect();
        out.units.push(Unit { texts });
    }
    log::debug!("extracted {} ({granularity})", out.summary());
    Ok(out)
}
