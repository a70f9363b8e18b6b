//! Idempotent PDF downloading.
//!
//! A destination that already exists is treated as done, which makes
//! re-running a partially completed batch cheap: no network call is made
//! for finished targets.

use std::path::{Path, PathBuf};

use reqwest::Response;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::DEFAULT_MAX_DOWNLOAD_BYTES;
use crate::error::{HarvesterError, Result};
use crate::http::{content_type, is_html, Fetcher};
use crate::links::LinkExtractor;
use crate::resolver::PdfResolver;
use crate::types::{CandidateArticle, Resolution, ResolvedTarget, RetrievalOutcome};

/// Fetch-and-save of resolved PDF URLs.
pub struct Downloader {
    fetcher: Fetcher,
    metadata: LinkExtractor,
    max_bytes: u64,
}

impl Downloader {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            metadata: LinkExtractor::citation_meta(),
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Download `pdf_url` to `dest` and return the destination filename.
    ///
    /// If `dest` exists the call returns immediately. An HTML answer gets one
    /// re-resolution through the page's citation metadata before failing.
    pub async fn fetch(&self, pdf_url: &Url, dest: &Path) -> Result<String> {
        let filename = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                HarvesterError::InvalidInput(format!("not a file path: {}", dest.display()))
            })?;

        if fs::try_exists(dest).await? {
            tracing::info!(file = %filename, "already downloaded, skipping");
            return Ok(filename);
        }

        let response = self.fetcher.get(pdf_url).await?;
        let response = match content_type(&response) {
            Some(ct) if is_html(&ct) => self.follow_landing_page(pdf_url, response).await?,
            _ => response,
        };

        self.save(response, dest).await?;
        tracing::info!(file = %filename, url = %pdf_url, "downloaded");
        Ok(filename)
    }

    /// Re-resolve an HTML landing page through its citation metadata, once.
    async fn follow_landing_page(&self, pdf_url: &Url, response: Response) -> Result<Response> {
        let page_url = response.url().clone();
        let body = response.text().await?;

        let Some(real) = self.metadata.first(&body, &page_url).map(|l| l.url) else {
            return Err(HarvesterError::UnexpectedContentType {
                url: pdf_url.to_string(),
                content_type: "text/html".to_string(),
            });
        };

        tracing::debug!(from = %pdf_url, to = %real, "PDF URL served HTML, following citation metadata");
        let second = self.fetcher.get(&real).await?;
        if let Some(ct) = content_type(&second) {
            if is_html(&ct) {
                return Err(HarvesterError::UnexpectedContentType {
                    url: real.to_string(),
                    content_type: ct,
                });
            }
        }
        Ok(second)
    }

    /// Stream a confirmed-200 response into a temp file, then rename.
    async fn save(&self, response: Response, dest: &Path) -> Result<()> {
        let parent = dest.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent).await?;

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(".{name}.part"));

        match self.write_body(response, &temp).await {
            Ok(()) => {
                fs::rename(&temp, dest).await?;
                Ok(())
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp).await {
                    tracing::debug!(file = %temp.display(), error = %cleanup, "failed to remove partial file");
                }
                Err(e)
            }
        }
    }

    async fn write_body(&self, mut response: Response, temp: &Path) -> Result<()> {
        let url = response.url().to_string();
        let mut file = fs::File::create(temp).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(HarvesterError::ResponseTooLarge {
                    url,
                    max_bytes: self.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.sync_all().await?;
        Ok(())
    }
}

/// Full retrieval step for one candidate: resolve, then download.
pub struct Retriever {
    resolver: PdfResolver,
    downloader: Downloader,
    dir: PathBuf,
    /// Subdirectories of `dir` that finished files may have been moved to.
    filed_dirs: Vec<PathBuf>,
}

impl Retriever {
    pub fn new(resolver: PdfResolver, downloader: Downloader, dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            downloader,
            dir: dir.into(),
            filed_dirs: Vec::new(),
        }
    }

    /// Build a retriever whose resolver and downloader share one fetcher.
    pub fn from_fetcher(fetcher: Fetcher, dir: impl Into<PathBuf>) -> Self {
        Self::new(
            PdfResolver::new(fetcher.clone()),
            Downloader::new(fetcher),
            dir,
        )
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.downloader = self.downloader.with_max_bytes(max_bytes);
        self
    }

    /// Also treat a file found in any of these subdirectories of the
    /// download directory as already downloaded.
    pub fn with_filed_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let filed = dirs.into_iter().map(|d| self.dir.join(d)).collect();
        self.filed_dirs = filed;
        self
    }

    /// Download directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination path for a candidate.
    pub fn destination(&self, candidate: &CandidateArticle) -> PathBuf {
        self.dir.join(candidate.filename())
    }

    /// Where `filename` already exists, in the download directory or one of
    /// the filed subdirectories.
    async fn existing(&self, filename: &str) -> std::io::Result<Option<PathBuf>> {
        for dir in std::iter::once(&self.dir).chain(&self.filed_dirs) {
            let path = dir.join(filename);
            if fs::try_exists(&path).await? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Resolve a candidate's item page to a PDF URL.
    pub async fn resolve(&self, candidate: &CandidateArticle) -> ResolvedTarget {
        let resolution = match Url::parse(&candidate.link) {
            Ok(page) => match self.resolver.resolve(&page).await {
                Ok(pdf) => Resolution::Resolved(pdf),
                Err(e) => Resolution::Unresolved(e.to_string()),
            },
            Err(e) => Resolution::Unresolved(format!("invalid link '{}': {e}", candidate.link)),
        };
        ResolvedTarget {
            candidate: candidate.clone(),
            resolution,
        }
    }

    /// Retrieve one candidate to its default filename.
    pub async fn retrieve(&self, candidate: &CandidateArticle) -> RetrievalOutcome {
        self.retrieve_as(candidate, &candidate.filename()).await
    }

    /// Retrieve one candidate to `filename`, always yielding exactly one
    /// outcome.
    ///
    /// The destination is checked before the item page is fetched, so a
    /// finished target costs no network calls.
    pub async fn retrieve_as(
        &self,
        candidate: &CandidateArticle,
        filename: &str,
    ) -> RetrievalOutcome {
        match self.existing(filename).await {
            Ok(Some(found)) => {
                tracing::info!(file = %found.display(), "already downloaded, skipping");
                return RetrievalOutcome::success(candidate, filename);
            }
            Ok(None) => {}
            Err(e) => return RetrievalOutcome::failed(candidate, e),
        }
        let dest = self.dir.join(filename);

        let target = self.resolve(candidate).await;
        match target.resolution {
            Resolution::Unresolved(reason) => {
                tracing::warn!(link = %candidate.link, reason = %reason, "could not resolve PDF");
                RetrievalOutcome::failed(&target.candidate, reason)
            }
            Resolution::Resolved(pdf_url) => match self.downloader.fetch(&pdf_url, &dest).await {
                Ok(filename) => RetrievalOutcome::success(&target.candidate, filename),
                Err(e) => {
                    tracing::warn!(link = %candidate.link, pdf = %pdf_url, error = %e, "download failed");
                    RetrievalOutcome::failed(&target.candidate, e)
                }
            },
        }
    }
}
