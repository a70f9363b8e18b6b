//! Repository query engine.
//!
//! Repositories expose their search UI under different, undocumented paths.
//! The engine tries an ordered list of [`SearchStrategy`]s and keeps the
//! first one that answers with at least one item link.

use std::collections::HashSet;

use url::Url;

use crate::config::{DEFAULT_ENDPOINTS, DEFAULT_ITEM_MARKER, DEFAULT_PAGE_SIZE};
use crate::error::{HarvesterError, Result};
use crate::http::Fetcher;
use crate::links::LinkExtractor;
use crate::types::{CandidateArticle, SourceRepository};

/// One way of searching a repository.
///
/// Strategies are pure: they build a URL and interpret a response body. The
/// engine owns the network.
pub trait SearchStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Full search URL for a term.
    fn search_url(&self, repo: &SourceRepository, term: &str) -> Result<Url>;

    /// Extract candidates from a results page fetched from `page_url`.
    fn extract(
        &self,
        repo: &SourceRepository,
        term: &str,
        page_url: &Url,
        html: &str,
    ) -> Vec<CandidateArticle>;
}

/// Search by appending an endpoint suffix to the repository base URL.
pub struct PathSearchStrategy {
    suffix: String,
    page_size: u32,
    items: LinkExtractor,
}

impl PathSearchStrategy {
    pub fn new(suffix: impl Into<String>, page_size: u32, item_marker: &str) -> Self {
        Self {
            suffix: suffix.into(),
            page_size,
            items: LinkExtractor::items(item_marker),
        }
    }
}

impl SearchStrategy for PathSearchStrategy {
    fn name(&self) -> &str {
        &self.suffix
    }

    fn search_url(&self, repo: &SourceRepository, term: &str) -> Result<Url> {
        let base = repo.base_url.as_str().trim_end_matches('/');
        let raw = format!("{base}{}", self.suffix);
        let mut url = Url::parse(&raw).map_err(|source| HarvesterError::InvalidUrl {
            url: raw.clone(),
            source,
        })?;
        url.query_pairs_mut()
            .append_pair("query", term)
            .append_pair("rpp", &self.page_size.to_string());
        Ok(url)
    }

    fn extract(
        &self,
        repo: &SourceRepository,
        term: &str,
        _page_url: &Url,
        html: &str,
    ) -> Vec<CandidateArticle> {
        // Item hrefs are resolved against the repository base, not the search
        // endpoint, so path-relative links keep the repository prefix.
        self.items
            .extract(html, &repo.base_url)
            .into_iter()
            .map(|link| CandidateArticle::discovered(repo, term, &link.text, &link.url))
            .collect()
    }
}

/// Ordered strategy ladder over a shared fetcher.
pub struct QueryEngine {
    fetcher: Fetcher,
    strategies: Vec<Box<dyn SearchStrategy>>,
}

impl QueryEngine {
    pub fn new(fetcher: Fetcher, strategies: Vec<Box<dyn SearchStrategy>>) -> Self {
        Self {
            fetcher,
            strategies,
        }
    }

    /// Engine with one [`PathSearchStrategy`] per endpoint suffix.
    pub fn with_endpoints<S: AsRef<str>>(
        fetcher: Fetcher,
        endpoints: &[S],
        page_size: u32,
        item_marker: &str,
    ) -> Self {
        let strategies = endpoints
            .iter()
            .map(|e| {
                Box::new(PathSearchStrategy::new(e.as_ref(), page_size, item_marker))
                    as Box<dyn SearchStrategy>
            })
            .collect();
        Self::new(fetcher, strategies)
    }

    /// Engine using the default DSpace endpoints.
    pub fn dspace(fetcher: Fetcher) -> Self {
        Self::with_endpoints(fetcher, DEFAULT_ENDPOINTS, DEFAULT_PAGE_SIZE, DEFAULT_ITEM_MARKER)
    }

    /// Search one repository for one term.
    ///
    /// Per-endpoint failures are swallowed. An error is returned only when
    /// every endpoint came up empty and the last one failed at request level.
    pub async fn query(
        &self,
        repo: &SourceRepository,
        term: &str,
    ) -> Result<Vec<CandidateArticle>> {
        let mut last_error: Option<HarvesterError> = None;

        for strategy in &self.strategies {
            let url = match strategy.search_url(repo, term) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(repo = %repo.id, endpoint = strategy.name(), error = %e, "cannot build search URL");
                    last_error = None;
                    continue;
                }
            };

            let page = match self.fetcher.get_page(&url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!(repo = %repo.id, endpoint = strategy.name(), error = %e, "search endpoint failed");
                    last_error = e.is_request_level().then_some(e);
                    continue;
                }
            };

            let hits = strategy.extract(repo, term, &page.url, &page.body);
            if hits.is_empty() {
                tracing::debug!(repo = %repo.id, endpoint = strategy.name(), "no results");
                last_error = None;
                continue;
            }

            tracing::info!(
                repo = %repo.id,
                term,
                endpoint = strategy.name(),
                found = hits.len(),
                "search succeeded"
            );
            return Ok(dedup_by_link(hits));
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }
}

/// Keep the first candidate per link.
fn dedup_by_link(candidates: Vec<CandidateArticle>) -> Vec<CandidateArticle> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.link.clone()))
        .collect()
}
