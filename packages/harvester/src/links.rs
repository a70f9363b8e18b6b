//! Rule-based link extraction from HTML pages.
//!
//! Repository pages do not share a schema, so links are classified by an
//! ordered set of [`LinkRule`]s. Each rule carries a confidence rank (lower
//! wins); supporting a new repository quirk means adding a rule, not
//! another branch.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

/// `<meta name="citation_pdf_url">` (Highwire/Google Scholar tags).
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static CITATION_PDF_META: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="citation_pdf_url"]"#).expect("valid selector")
});

/// Any anchor with an href.
#[allow(clippy::expect_used)] // Static selector that is guaranteed to be valid
static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Href fragments marking navigation links (facets, sorting, exports).
const NAVIGATION_MARKERS: &[&str] = &["?", "sort_by", "filtername"];

/// A link as it appears in the page, before URL resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub href: String,
    pub text: String,
}

/// A link matched by a rule and resolved to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: Url,
    /// Trimmed display text (empty for meta tags).
    pub text: String,
    /// Name of the rule that matched.
    pub rule: &'static str,
    /// Confidence rank of that rule (0 = highest).
    pub rank: u8,
}

/// A single link classification heuristic.
pub trait LinkRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Confidence rank; rules are evaluated in ascending order.
    fn rank(&self) -> u8;

    /// Return matching links in document order.
    fn matches(&self, doc: &Html) -> Vec<RawLink>;
}

/// Repository-asserted canonical PDF URL from citation metadata.
pub struct CitationPdfMetaRule;

impl LinkRule for CitationPdfMetaRule {
    fn name(&self) -> &'static str {
        "citation_pdf_url"
    }

    fn rank(&self) -> u8 {
        0
    }

    fn matches(&self, doc: &Html) -> Vec<RawLink> {
        doc.select(&CITATION_PDF_META)
            .filter_map(|meta| meta.value().attr("content"))
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(|content| RawLink {
                href: content.to_string(),
                text: String::new(),
            })
            .collect()
    }
}

/// Anchor into the asset store (`bitstream`) pointing at a PDF.
pub struct BitstreamPdfRule;

impl LinkRule for BitstreamPdfRule {
    fn name(&self) -> &'static str {
        "bitstream_pdf"
    }

    fn rank(&self) -> u8 {
        1
    }

    fn matches(&self, doc: &Html) -> Vec<RawLink> {
        doc.select(&ANCHOR)
            .filter_map(|a| {
                let href = a.value().attr("href")?.trim();
                let lower = href.to_ascii_lowercase();
                // The extension check ignores query strings like ?sequence=1
                let path = lower.split(['?', '#']).next().unwrap_or_default();
                (lower.contains("bitstream") && path.ends_with(".pdf")).then(|| RawLink {
                    href: href.to_string(),
                    text: anchor_text(&a),
                })
            })
            .collect()
    }
}

/// Anchor to a repository item page (e.g. DSpace `/handle/123/456`).
pub struct ItemHandleRule {
    marker: String,
}

impl ItemHandleRule {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl LinkRule for ItemHandleRule {
    fn name(&self) -> &'static str {
        "item_handle"
    }

    fn rank(&self) -> u8 {
        2
    }

    fn matches(&self, doc: &Html) -> Vec<RawLink> {
        doc.select(&ANCHOR)
            .filter_map(|a| {
                let href = a.value().attr("href")?.trim();
                if !href.contains(self.marker.as_str()) {
                    return None;
                }
                if NAVIGATION_MARKERS.iter().any(|m| href.contains(m)) {
                    return None;
                }
                let text = anchor_text(&a);
                if text.is_empty() {
                    return None;
                }
                Some(RawLink {
                    href: href.to_string(),
                    text,
                })
            })
            .collect()
    }
}

/// Anchor text with whitespace runs collapsed and ends trimmed.
fn anchor_text(a: &scraper::ElementRef<'_>) -> String {
    a.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered rule set evaluated against a parsed page.
pub struct LinkExtractor {
    rules: Vec<Box<dyn LinkRule>>,
}

impl LinkExtractor {
    /// Build an extractor; rules are sorted by rank.
    pub fn new(mut rules: Vec<Box<dyn LinkRule>>) -> Self {
        rules.sort_by_key(|r| r.rank());
        Self { rules }
    }

    /// Rules for locating a document's PDF on its item page.
    pub fn pdf() -> Self {
        Self::new(vec![Box::new(CitationPdfMetaRule), Box::new(BitstreamPdfRule)])
    }

    /// Only the repository-asserted citation metadata rule.
    pub fn citation_meta() -> Self {
        Self::new(vec![Box::new(CitationPdfMetaRule)])
    }

    /// Rules for item links on a search results page.
    pub fn items(marker: &str) -> Self {
        Self::new(vec![Box::new(ItemHandleRule::new(marker))])
    }

    /// All matches of all rules, in rank then document order, resolved
    /// against `base` and deduplicated by absolute URL.
    ///
    /// Hrefs that cannot be resolved (e.g. `javascript:` junk that is not a
    /// valid URL) are dropped.
    pub fn extract(&self, html: &str, base: &Url) -> Vec<ExtractedLink> {
        let doc = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for rule in &self.rules {
            for raw in rule.matches(&doc) {
                let Some(url) = resolve(base, &raw.href) else {
                    tracing::debug!(href = %raw.href, rule = rule.name(), "unresolvable href");
                    continue;
                };
                if !seen.insert(url.clone()) {
                    continue;
                }
                links.push(ExtractedLink {
                    url,
                    text: raw.text,
                    rule: rule.name(),
                    rank: rule.rank(),
                });
            }
        }

        links
    }

    /// The highest-confidence match, if any.
    pub fn first(&self, html: &str, base: &Url) -> Option<ExtractedLink> {
        let doc = Html::parse_document(html);
        self.rules.iter().find_map(|rule| {
            rule.matches(&doc).into_iter().find_map(|raw| {
                resolve(base, &raw.href).map(|url| ExtractedLink {
                    url,
                    text: raw.text,
                    rule: rule.name(),
                    rank: rule.rank(),
                })
            })
        })
    }
}

/// Resolve an href against a base URL.
///
/// Root-relative hrefs land on the base's scheme and host; path-relative
/// hrefs are appended to the base path (which must end with `/` to act as a
/// directory).
///
/// # Examples
/// ```
/// use litscout_harvester::links::resolve;
/// use url::Url;
///
/// let base = Url::parse("https://repo.example/riuff/").unwrap();
/// assert_eq!(resolve(&base, "/handle/1/2").unwrap().as_str(), "https://repo.example/handle/1/2");
/// assert_eq!(resolve(&base, "handle/1/2").unwrap().as_str(), "https://repo.example/riuff/handle/1/2");
/// ```
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    let url = base.join(href.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
