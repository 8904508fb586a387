//! Document store - the paginated source protocol.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{IngestError, IngestResult};

/// A contiguous, page-tagged span of the source document.
///
/// `start..end` are byte offsets into [`DocumentStore::full_text`].
/// Serialize-only: segments are built by [`DocumentStore::from_pages`],
/// which also fills the normalized form.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSegment {
    pub page: u32,
    pub start: usize,
    pub end: usize,
    pub text: String,

    /// Lowercased, whitespace-collapsed form used for quote verification
    #[serde(skip)]
    normalized: String,
}

impl DocumentSegment {
    /// Normalized text of this segment.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Read-only, page-indexed view of the source protocol.
///
/// Segments cover the concatenated text exactly once, in reading order,
/// with strictly increasing page numbers.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    source: String,
    segments: Vec<DocumentSegment>,
    full_text: String,
    content_hash: String,
}

impl DocumentStore {
    /// Build a store from `(page number, text)` pairs in reading order.
    pub fn from_pages(
        source: impl Into<String>,
        pages: impl IntoIterator<Item = (u32, String)>,
    ) -> IngestResult<Self> {
        let source = source.into();
        let mut segments: Vec<DocumentSegment> = Vec::new();
        let mut full_text = String::new();

        for (page, text) in pages {
            if let Some(previous) = segments.last().map(|s| s.page) {
                if page <= previous {
                    return Err(IngestError::PageOrder { previous, page });
                }
            }

            let start = full_text.len();
            full_text.push_str(&text);
            let end = full_text.len();

            segments.push(DocumentSegment {
                page,
                start,
                end,
                normalized: normalize(&text),
                text,
            });
        }

        if segments.iter().all(|s| s.text.trim().is_empty()) {
            return Err(IngestError::Empty {
                source_name: source,
            });
        }

        let content_hash = Self::hash_content(&full_text);

        Ok(Self {
            source,
            segments,
            full_text,
            content_hash,
        })
    }

    /// Calculate SHA-256 hash of content.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Where the document was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[DocumentSegment] {
        &self.segments
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// SHA-256 fingerprint of the full text.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn page_count(&self) -> usize {
        self.segments.len()
    }

    /// Find the segment tagged with `page`.
    pub fn segment_for_page(&self, page: u32) -> Option<&DocumentSegment> {
        self.segments
            .binary_search_by_key(&page, |s| s.page)
            .ok()
            .map(|idx| &self.segments[idx])
    }

    /// Text of the given segments with `--- PAGE N ---` markers.
    pub fn render_pages(&self, indices: &[usize]) -> String {
        indices
            .iter()
            .filter_map(|&i| self.segments.get(i))
            .map(|s| format!("--- PAGE {} ---\n{}", s.page, s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lowercase and collapse all whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
