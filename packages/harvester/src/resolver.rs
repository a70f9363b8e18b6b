//! PDF resolution from repository item pages.

use url::Url;

use crate::error::{HarvesterError, Result};
use crate::http::Fetcher;
use crate::links::{ExtractedLink, LinkExtractor};

/// Turns an item page into a single best-candidate PDF URL.
///
/// Strategy ladder (first match wins):
/// 1. `<meta name="citation_pdf_url">`
/// 2. first anchor into the asset store (`bitstream`) ending in `.pdf`
pub struct PdfResolver {
    fetcher: Fetcher,
    rules: LinkExtractor,
    metadata: LinkExtractor,
}

impl PdfResolver {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            rules: LinkExtractor::pdf(),
            metadata: LinkExtractor::citation_meta(),
        }
    }

    /// Fetch an item page and resolve its PDF URL.
    ///
    /// Relative links resolve against the item page (after redirects), never
    /// against the repository base.
    pub async fn resolve(&self, item_page: &Url) -> Result<Url> {
        let page = self.fetcher.get_page(item_page).await?;
        let link = self
            .resolve_html(&page.body, &page.url)
            .ok_or_else(|| HarvesterError::PdfNotFound(item_page.to_string()))?;
        tracing::debug!(page = %item_page, pdf = %link.url, rule = link.rule, "resolved PDF");
        Ok(link.url)
    }

    /// Apply the full ladder to an already-fetched page.
    pub fn resolve_html(&self, html: &str, page_url: &Url) -> Option<ExtractedLink> {
        self.rules.first(html, page_url)
    }

    /// Apply only the citation metadata rule.
    ///
    /// Used when a supposed PDF URL answered with HTML: that page is usually
    /// a landing page that names the real file.
    pub fn resolve_metadata_only(&self, html: &str, page_url: &Url) -> Option<Url> {
        self.metadata.first(html, page_url).map(|link| link.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn resolver() -> PdfResolver {
        PdfResolver::new(Fetcher::new(Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_relative_meta_resolves_against_item_page() {
        let html = r#"<html><head><meta name="citation_pdf_url" content="/files/x.pdf"></head></html>"#;
        let page = Url::parse("https://repo.example/handle/1/1").unwrap();
        let link = resolver().resolve_html(html, &page).unwrap();
        assert_eq!(link.url.as_str(), "https://repo.example/files/x.pdf");
    }

    #[test]
    fn test_path_relative_bitstream_resolves_against_item_page() {
        let html = r#"<a href="../../bitstream/1/1/paper.pdf">Download</a>"#;
        let page = Url::parse("https://repo.example/jspui/handle/1/1").unwrap();
        let link = resolver().resolve_html(html, &page).unwrap();
        assert_eq!(link.url.as_str(), "https://repo.example/jspui/bitstream/1/1/paper.pdf");
    }

    #[test]
    fn test_no_pdf_link() {
        let html = r#"<a href="/handle/1/1?mode=full">Full record</a>"#;
        let page = Url::parse("https://repo.example/handle/1/1").unwrap();
        assert!(resolver().resolve_html(html, &page).is_none());
    }

    #[test]
    fn test_metadata_only_ignores_bitstream_anchor() {
        let html = r#"<a href="/bitstream/1/1/paper.pdf">Download</a>"#;
        let page = Url::parse("https://repo.example/handle/1/1").unwrap();
        assert!(resolver().resolve_metadata_only(html, &page).is_none());
    }
}
