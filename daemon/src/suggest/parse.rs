use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GeneratedEntry {
    pub title: String,
    #[serde(alias = "description")]
    pub desc: String,
    pub keyword: String,
}

pub fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(start) = text.find("```") else {
        return text;
    };
    // drop only the info string, e.g. "json"; the payload may share its line
    let inner = text[start + 3..].trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    match inner.find("```") {
        Some(end) => inner[..end].trim(),
        None => inner.trim(),
    }
}

pub fn parse_generated(raw: &str) -> Result<Vec<GeneratedEntry>> {
    let cleaned = strip_code_fence(raw);
    serde_json::from_str::<Vec<GeneratedEntry>>(cleaned)
        .context("generated suggestions are not a JSON array of {title, desc, keyword}")
}
