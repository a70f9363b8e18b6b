//! Bounded PDF text extraction.
//!
//! Only the opening pages (abstract, introduction) and the closing pages
//! (references) are read; the body is replaced by a marker.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

pub const SKIPPED_BODY_MARKER: &str = "\n...[Skipped Body]...\n";

/// How many pages to read from each end of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub head: usize,
    pub tail: usize,
}

impl PageWindow {
    pub fn new(head: usize, tail: usize) -> Self {
        Self { head, tail }
    }

    /// 1-based page numbers for the head and tail of a `total`-page document.
    /// The tail never overlaps the head.
    pub fn select(&self, total: u32) -> (Vec<u32>, Vec<u32>) {
        let head_end = total.min(u32::try_from(self.head).unwrap_or(u32::MAX));
        let tail_len = u32::try_from(self.tail).unwrap_or(u32::MAX);
        let tail_start = total
            .saturating_sub(tail_len)
            .saturating_add(1)
            .max(head_end.saturating_add(1));
        ((1..=head_end).collect(), (tail_start..=total).collect())
    }
}

/// Text of the head and tail pages of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub head: String,
    pub tail: String,
}

impl PageText {
    /// Head, marker, tail, truncated to `max_chars` characters.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let mut text = String::with_capacity(self.head.len() + self.tail.len() + 32);
        if !self.head.is_empty() {
            text.push_str(&self.head);
            text.push_str(SKIPPED_BODY_MARKER);
        }
        text.push_str(&self.tail);
        truncate_chars(text, max_chars)
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(mut text: String, max_chars: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max_chars) {
        text.truncate(idx);
    }
    text
}

/// Reads page text out of a document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path, window: PageWindow) -> Result<PageText>;
}

/// [`TextExtractor`] backed by `lopdf`, run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, path: &Path, window: PageWindow) -> Result<PageText> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_blocking(&path, window)).await?
    }
}

fn extract_blocking(path: &Path, window: PageWindow) -> Result<PageText> {
    let document = lopdf::Document::load(path).map_err(|e| PipelineError::TextExtraction {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let total = u32::try_from(document.get_pages().len()).unwrap_or(u32::MAX);
    let (head, tail) = window.select(total);

    let read = |pages: &[u32]| -> String {
        pages
            .iter()
            .filter_map(|&page| match document.extract_text(&[page]) {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!(path = %path.display(), page, error = %e, "page has no extractable text");
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    Ok(PageText {
        head: read(&head),
        tail: read(&tail),
    })
}

/// Test utilities for text extraction.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;

    /// Returns the same text for every document.
    pub struct StaticExtractor {
        text: Option<PageText>,
    }

    impl StaticExtractor {
        pub fn new(head: &str, tail: &str) -> Self {
            Self {
                text: Some(PageText {
                    head: head.to_string(),
                    tail: tail.to_string(),
                }),
            }
        }

        /// An extractor that fails on every document.
        pub fn failing() -> Self {
            Self { text: None }
        }
    }

    #[async_trait]
    impl TextExtractor for StaticExtractor {
        async fn extract(&self, path: &Path, _window: PageWindow) -> Result<PageText> {
            self.text.clone().ok_or_else(|| PipelineError::TextExtraction {
                path: path.to_path_buf(),
                message: "unreadable".to_string(),
            })
        }
    }
}
