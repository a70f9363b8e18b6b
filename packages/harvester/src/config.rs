//! Configuration constants and validation functions for the harvester.

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{HarvesterError, Result};

/// Browser-like user agent. Several repositories reject unknown clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Timeout for search requests in seconds.
pub const SEARCH_TIMEOUT_SECS: u64 = 30;

/// Timeout for item page and PDF requests in seconds.
///
/// Longer than the search timeout since PDFs on slow repositories can take a
/// while to stream.
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 60;

/// Default maximum PDF size in bytes (100 MB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Search endpoint suffixes tried in priority order: the discovery UI first,
/// then the legacy JSPUI/XMLUI variants.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "/discover",
    "/simple-search",
    "/jspui/simple-search",
    "/xmlui/simple-search",
];

/// Path segment identifying repository item pages.
pub const DEFAULT_ITEM_MARKER: &str = "/handle/";

/// Result-size hint sent as the `rpp` query parameter.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum length of the sanitized title part of a filename.
pub const TITLE_MAX_LEN: usize = 50;

/// Parse a repository base URL and normalize it to end with `/`.
///
/// # Examples
/// ```
/// use litscout_harvester::config::normalize_base_url;
///
/// let url = normalize_base_url(" https://repo.example/riuff ").unwrap();
/// assert_eq!(url.as_str(), "https://repo.example/riuff/");
/// assert!(normalize_base_url("not a url").is_err());
/// ```
pub fn normalize_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|source| HarvesterError::InvalidUrl {
        url: trimmed.to_string(),
        source,
    })
}

/// Sanitize a title for use in a filename.
///
/// Every character outside `[A-Za-z0-9_-]` becomes `_` and the result is
/// capped at [`TITLE_MAX_LEN`] characters.
///
/// # Examples
/// ```
/// use litscout_harvester::config::sanitize_title;
///
/// assert_eq!(sanitize_title("Study of X"), "Study_of_X");
/// assert_eq!(sanitize_title("Fermentação/2020"), "Fermenta__o_2020");
/// ```
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(TITLE_MAX_LEN)
        .collect()
}

/// Build the destination filename for a candidate.
///
/// # Examples
/// ```
/// use litscout_harvester::config::pdf_filename;
///
/// assert_eq!(pdf_filename("R1", "Study of X"), "R1_Study_of_X.pdf");
/// ```
pub fn pdf_filename(repo_id: &str, title: &str) -> String {
    let repo = sanitize_title(repo_id);
    format!("{repo}_{}.pdf", sanitize_title(title))
}

/// Hex characters of the link digest appended by [`pdf_filename_with_digest`].
pub const LINK_DIGEST_LEN: usize = 8;

/// Filename for a candidate whose [`pdf_filename`] is already taken by a
/// different item, suffixed with a digest of the item link.
///
/// # Examples
/// ```
/// use litscout_harvester::config::{pdf_filename_with_digest, LINK_DIGEST_LEN};
///
/// let name = pdf_filename_with_digest("R1", "Study of X", "https://repo.example/handle/1/2");
/// assert!(name.starts_with("R1_Study_of_X_"));
/// assert_eq!(name.len(), "R1_Study_of_X_".len() + LINK_DIGEST_LEN + ".pdf".len());
/// ```
pub fn pdf_filename_with_digest(repo_id: &str, title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}_{}_{}.pdf",
        sanitize_title(repo_id),
        sanitize_title(title),
        &digest[..LINK_DIGEST_LEN]
    )
}
