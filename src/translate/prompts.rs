use crate::transfer::ExtractedDocument;

pub const DEFAULT_STYLE: &str = "direct";
pub const DEFAULT_TOPIC: &str = "general";

pub const BASE_PROMPT: &str = r#"Translate the following JSON structure{{source_lang_text}} to {{target_lang}}.

{{style_instructions}}

{{topic_instructions}}

CRITICAL REQUIREMENTS:
1. Preserve the EXACT JSON structure with the "{{root_key}}" array and "texts" arrays
2. Only translate the text content inside the "texts" arrays
3. Do NOT translate the JSON keys ("{{root_key}}", "texts")
4. Return ONLY valid JSON, no additional text or explanation
5. Maintain the same number of {{root_key}} and text elements
{{retry_block}}
Input JSON:
{{json_data}}

Return the translated JSON:"#;

pub const BUILTIN_STYLES: &[(&str, &str)] = &[
    (
        "direct",
        "Translation Style: Use direct, clear, and concise language.
- Avoid overly formal or flowery language
- Use active voice where possible
- Be straightforward and to the point
- Maintain professional tone while being accessible",
    ),
    (
        "formal",
        "Translation Style: Use formal, professional language.
- Maintain formal register throughout
- Use complete sentences and proper grammar
- Avoid contractions and colloquialisms
- Use industry-standard terminology",
    ),
    (
        "casual",
        "Translation Style: Use casual, conversational language.
- Use natural, everyday expressions
- Keep it friendly and approachable
- Use contractions where natural
- Speak directly to the reader",
    ),
    (
        "technical",
        "Translation Style: Use precise technical language.
- Maintain technical accuracy
- Use exact technical terms
- Preserve all technical specifications
- Keep professional and precise",
    ),
];

pub const BUILTIN_TOPICS: &[(&str, &str)] = &[
    (
        "diving",
        "Topic Context: This content is about SCUBA diving and deep diving.
- Use correct diving terminology (e.g., \"depth\", \"decompression\", \"nitrogen narcosis\")
- Maintain safety-critical information accurately
- Use terminology recognized by diving certification organizations (PADI, SSI, SDI, etc.)
- Preserve numerical values for depths, times, and safety limits exactly",
    ),
    (
        "medical",
        "Topic Context: This content is medical/healthcare related.
- Use accurate medical terminology
- Preserve all dosages, measurements, and medical specifications exactly
- Maintain formal medical register
- Use terminology consistent with medical standards",
    ),
    (
        "technical",
        "Topic Context: This content is technical documentation.
- Preserve all technical terms and specifications
- Maintain accuracy for measurements, codes, and technical details
- Use industry-standard terminology
- Keep technical precision",
    ),
    (
        "business",
        "Topic Context: This content is business-related.
- Use appropriate business terminology
- Maintain professional tone
- Use terminology common in business contexts
- Preserve numbers, dates, and business-specific terms accurately",
    ),
    (
        "education",
        "Topic Context: This content is educational material.
- Use clear, pedagogical language
- Maintain instructional tone
- Use terminology appropriate for learners
- Keep explanations accessible",
    ),
];

pub fn builtin_style(name: &str) -> Option<&'static str> {
    lookup(BUILTIN_STYLES, name)
}

pub fn builtin_topic(name: &str) -> Option<&'static str> {
    lookup(BUILTIN_TOPICS, name)
}

fn lookup(table: &[(&str, &'static str)], name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| *v)
}

/// Language and instruction text for one translation request.
#[derive(Clone, Debug, Default)]
pub struct PromptContext {
    pub target_lang: String,
    pub source_lang: Option<String>,
    pub style_instructions: String,
    pub topic_instructions: String,
}

pub fn build_prompt(
    doc: &ExtractedDocument,
    ctx: &PromptContext,
    retry_attempt: u32,
) -> Result<String, serde_json::Error> {
    let json_data = serde_json::to_string_pretty(doc)?;
    let source_lang_text = ctx
        .source_lang
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!(" from {s}"))
        .unwrap_or_default();
    let retry_block = retry_block(doc, retry_attempt);

    Ok(render_template(
        BASE_PROMPT,
        &[
            ("source_lang_text", source_lang_text.as_str()),
            ("target_lang", ctx.target_lang.as_str()),
            ("style_instructions", ctx.style_instructions.as_str()),
            ("topic_instructions", ctx.topic_instructions.as_str()),
            ("root_key", doc.kind.root_key()),
            ("retry_block", retry_block.as_str()),
            ("json_data", json_data.as_str()),
        ],
    ))
}

/// Warning appended once a response came back with the wrong shape. Gets blunter with
/// every attempt and spells out the per-unit counts.
fn retry_block(doc: &ExtractedDocument, retry_attempt: u32) -> String {
    if retry_attempt == 0 {
        return String::new();
    }
    let label = doc.kind.unit_label();
    let mut out = String::from("\n");
    if retry_attempt == 1 {
        out.push_str("WARNING: A previous translation changed the number of text elements.\n");
    } else {
        out.push_str(&format!(
            "FINAL WARNING (attempt {}): previous translations merged or split text elements.\n",
            retry_attempt + 1
        ));
        out.push_str("Never merge two strings into one and never split one string into several,\n");
        out.push_str("even when a sentence continues across elements. Keep empty strings empty.\n");
    }
    out.push_str(&format!(
        "The output MUST contain exactly {} {} entries with these text counts:\n",
        doc.units.len(),
        doc.kind.root_key()
    ));
    for (i, unit) in doc.units.iter().enumerate() {
        out.push_str(&format!("- {label} {}: {} texts\n", i + 1, unit.texts.len()));
    }
    out
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}
