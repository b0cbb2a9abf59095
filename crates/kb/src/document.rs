use serde::{Deserialize, Serialize};

/// Byte budget for a single composed chunk. Pages whose weighted text exceeds
/// it are split into several chunks at part boundaries.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 6000;

/// A scraped documentation page, one entry of the docs-map input layout.
///
/// Every field defaults to empty so pages scraped with older extractors still
/// parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub headers: Vec<String>,

    #[serde(default)]
    pub paragraphs: Vec<String>,

    /// Newline-separated items, one string per list
    #[serde(default)]
    pub lists: Vec<String>,

    /// Kept for fidelity with the scraper output; not embedded
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,

    /// Kept for fidelity with the scraper output; not embedded
    #[serde(default)]
    pub code_blocks: Vec<String>,
}

impl SourceDocument {
    /// Flattens the page into weighted text parts. The title is repeated three
    /// times and each header twice (prefixed with `Section: `) so they
    /// dominate the embedding; tables and code blocks are left out.
    #[must_use]
    pub fn compose_parts(&self) -> Vec<String> {
        let mut parts = Vec::new();

        let title = self.title.trim();
        if !title.is_empty() {
            for _ in 0..3 {
                parts.push(title.to_string());
            }
        }

        for header in &self.headers {
            let header = header.trim();
            if header.is_empty() {
                continue;
            }
            let line = format!("Section: {header}");
            parts.push(line.clone());
            parts.push(line);
        }

        for paragraph in &self.paragraphs {
            let paragraph = paragraph.trim();
            if !paragraph.is_empty() {
                parts.push(paragraph.to_string());
            }
        }

        for list in &self.lists {
            for item in list.lines() {
                let item = item.trim();
                if !item.is_empty() {
                    parts.push(item.to_string());
                }
            }
        }

        parts
    }

    /// Joins the weighted parts into embedding texts, starting a new segment
    /// whenever the byte budget would be exceeded. Parts are never split, so a
    /// single oversized part becomes its own segment.
    #[must_use]
    pub fn compose_texts(&self, max_bytes: usize) -> Vec<String> {
        let parts = self.compose_parts();
        if parts.is_empty() {
            return Vec::new();
        }

        let mut texts = Vec::new();
        let mut current = String::new();
        for part in parts {
            if !current.is_empty() && current.len() + part.len() + 1 > max_bytes {
                texts.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&part);
        }
        if !current.is_empty() {
            texts.push(current);
        }
        texts
    }
}
