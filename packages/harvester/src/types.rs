//! Core data types for the harvester.
//!
//! These types carry a discovered article through the pipeline stages:
//! repository → candidate → resolved target → retrieval outcome.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{pdf_filename, pdf_filename_with_digest};

/// An institutional repository to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepository {
    /// Registry identifier (e.g., "R1").
    pub id: String,

    /// Display name.
    pub name: String,

    /// Base URL, always ending with `/`.
    pub base_url: Url,
}

impl SourceRepository {
    /// Create a repository from an already-normalized base URL.
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_url: Url) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_url,
        }
    }
}

/// A discovered item believed to be a document of interest.
///
/// Field order matches the discovery log columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArticle {
    pub repo_id: String,
    pub repo_name: String,
    pub query: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub collected_at: String,
}

impl CandidateArticle {
    /// Create a candidate stamped with the current time.
    pub fn discovered(repo: &SourceRepository, term: &str, title: &str, link: &Url) -> Self {
        Self {
            repo_id: repo.id.clone(),
            repo_name: repo.name.clone(),
            query: term.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            collected_at: Utc::now().to_rfc3339(),
        }
    }

    /// Destination filename for this candidate's PDF.
    #[must_use]
    pub fn filename(&self) -> String {
        pdf_filename(&self.repo_id, &self.title)
    }

    /// Alternative filename used when [`Self::filename`] collides with
    /// another candidate's.
    #[must_use]
    pub fn filename_with_digest(&self) -> String {
        pdf_filename_with_digest(&self.repo_id, &self.title, &self.link)
    }
}

/// Result of PDF resolution for a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Url),
    Unresolved(String),
}

/// A candidate paired with its resolved PDF URL (or the reason there is none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub candidate: CandidateArticle,
    pub resolution: Resolution,
}

/// Status column of the retrieval log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStatus {
    Success,
    Failed,
}

impl RetrievalStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// One row of the retrieval log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub repo_id: String,
    pub title: String,
    pub link: String,
    pub status: RetrievalStatus,
    pub filename: String,
    pub error: String,
}

impl RetrievalOutcome {
    pub fn success(candidate: &CandidateArticle, filename: impl Into<String>) -> Self {
        Self {
            repo_id: candidate.repo_id.clone(),
            title: candidate.title.clone(),
            link: candidate.link.clone(),
            status: RetrievalStatus::Success,
            filename: filename.into(),
            error: String::new(),
        }
    }

    pub fn failed(candidate: &CandidateArticle, error: impl ToString) -> Self {
        Self {
            repo_id: candidate.repo_id.clone(),
            title: candidate.title.clone(),
            link: candidate.link.clone(),
            status: RetrievalStatus::Failed,
            filename: String::new(),
            error: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RetrievalStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate() -> CandidateArticle {
        CandidateArticle {
            repo_id: "R1".to_string(),
            repo_name: "RepoA".to_string(),
            query: "term1".to_string(),
            title: "Study of X".to_string(),
            link: "https://repo.example/handle/1/1".to_string(),
            collected_at: String::new(),
        }
    }

    #[test]
    fn test_candidate_filename() {
        assert_eq!(candidate().filename(), "R1_Study_of_X.pdf");
    }

    #[test]
    fn test_discovered_stamps_provenance() {
        let repo = SourceRepository::new(
            "R1",
            "RepoA",
            Url::parse("https://repo.example/").unwrap(),
        );
        let link = Url::parse("https://repo.example/handle/1/1").unwrap();
        let c = CandidateArticle::discovered(&repo, "term1", "Study of X", &link);
        assert_eq!(c.repo_id, "R1");
        assert_eq!(c.query, "term1");
        assert!(!c.collected_at.is_empty());
    }

    #[test]
    fn test_outcome_success_has_no_error() {
        let outcome = RetrievalOutcome::success(&candidate(), "R1_Study_of_X.pdf");
        assert!(outcome.is_success());
        assert_eq!(outcome.error, "");
        assert_eq!(outcome.status.as_str(), "success");
    }

    #[test]
    fn test_outcome_failed_has_no_filename() {
        let outcome = RetrievalOutcome::failed(&candidate(), "status 404");
        assert!(!outcome.is_success());
        assert_eq!(outcome.filename, "");
        assert_eq!(outcome.error, "status 404");
    }
}
