//! Turning raw model output into the final JSON document.
//!
//! Models wrap their JSON in all sorts of things: `<think>` blocks, markdown
//! fences, a sentence of preamble. The helpers here peel those off, then the
//! object is parsed into [`BulletinAnalysis`] and stamped with run metadata.

use serde_json::Value;

use crate::error::Result;
use crate::source::BulletinDate;
use crate::types::BulletinAnalysis;
use crate::PipelineError;

/// Extract `<think>...</think>` blocks from a response (DeepSeek R1 style).
///
/// Returns `(thinking_content, cleaned_text)` where `cleaned_text` has the
/// thinking block removed and is trimmed.
pub fn extract_thinking(text: &str) -> (Option<String>, String) {
    let think_start = "<think>";
    let think_end = "</think>";

    if let Some(start_idx) = text.find(think_start) {
        if let Some(end_idx) = text.find(think_end) {
            if end_idx > start_idx {
                let thinking = text[start_idx + think_start.len()..end_idx].trim();
                let mut cleaned = String::with_capacity(text.len());
                cleaned.push_str(&text[..start_idx]);
                cleaned.push_str(&text[end_idx + think_end.len()..]);
                let thinking = (!thinking.is_empty()).then(|| thinking.to_string());
                return (thinking, cleaned.trim().to_string());
            }
        }
    }

    (None, text.trim().to_string())
}

/// Extract content from the first markdown fenced code block.
///
/// Recognizes `` ```json ``, `` ```JSON `` and plain `` ``` `` fences.
pub fn extract_json_block(text: &str) -> Option<String> {
    for marker in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim().to_string());
            }
        }
    }
    None
}

/// Find the first balanced `{...}` in `text`, skipping braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locate a JSON object in text that may contain surrounding prose.
///
/// Tries, in order:
/// 1. The whole text
/// 2. Markdown code block extraction
/// 3. First `{` with its matching `}`
pub fn extract_json_candidate(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if serde_json::from_str::<Value>(trimmed).is_ok_and(|v| v.is_object()) {
        return Some(trimmed.to_string());
    }

    if let Some(block) = extract_json_block(trimmed) {
        if serde_json::from_str::<Value>(&block).is_ok() {
            return Some(block);
        }
    }

    balanced_object(trimmed)
        .filter(|candidate| serde_json::from_str::<Value>(candidate).is_ok())
        .map(str::to_string)
}

/// Parse a model response into the digest for `date`, produced by `model`.
///
/// Returns the typed analysis and its pretty-printed JSON. Any response that
/// does not contain a JSON object is a [`PipelineError::Parse`].
pub fn render(raw: &str, date: BulletinDate, model: &str) -> Result<(BulletinAnalysis, String)> {
    let (thinking, cleaned) = extract_thinking(raw);
    if let Some(thinking) = thinking {
        tracing::debug!(chars = thinking.len(), "discarded reasoning block");
    }

    let candidate = extract_json_candidate(&cleaned).ok_or_else(|| {
        PipelineError::Parse(format!(
            "no JSON object in model output: {}",
            truncate(&cleaned, 200)
        ))
    })?;

    let value: Value = serde_json::from_str(&candidate)?;
    if !value.is_object() {
        return Err(PipelineError::Parse(format!(
            "expected a JSON object, got: {}",
            truncate(&candidate, 200)
        )));
    }

    let mut analysis: BulletinAnalysis = serde_json::from_value(value)
        .map_err(|e| PipelineError::Parse(format!("unexpected structure: {}", e)))?;
    analysis.source_date = date.to_string();
    analysis.model_used = model.to_string();
    analysis.processing_date = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();

    let json = serde_json::to_string_pretty(&analysis)?;
    Ok((analysis, json))
}

/// At most `max_chars` characters of `text`, cut on a character boundary.
pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
