/// Extraction of a JSON payload from model output that may wrap it in
/// prose or markdown code fences.

use serde_json::Value;

use super::backend::GenerationError;

/// Strip code-fence markers, locate the outermost `{...}` span, and parse
/// it as JSON.
pub fn extract_json_object(raw: &str) -> Result<Value, GenerationError> {
    let clean = strip_code_fences(raw);
    let start = clean.find('{').ok_or(GenerationError::MissingPayload)?;
    let end = clean.rfind('}').ok_or(GenerationError::MissingPayload)?;
    if end <= start {
        return Err(GenerationError::MissingPayload);
    }
    Ok(serde_json::from_str(&clean[start..=end])?)
}

/// Remove every ``` fence marker, including a trailing `json` language tag
/// in any case.
fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        if rest.len() >= 4 && rest.as_bytes()[..4].eq_ignore_ascii_case(b"json") {
            rest = &rest[4..];
        }
    }
    out.push_str(rest);
    out
}
