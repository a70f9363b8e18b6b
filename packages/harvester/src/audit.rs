//! Append-only CSV audit logs.
//!
//! Every pipeline stage writes one row per processed item as soon as it is
//! produced. The header is written only when the file is new, so a log can
//! be appended to across runs and doubles as the durable progress record.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

/// Discovery log columns.
pub const DISCOVERY_HEADER: &[&str] =
    &["repo_id", "repo_name", "query", "title", "link", "collected_at"];

/// Retrieval log columns.
pub const RETRIEVAL_HEADER: &[&str] = &["repo_id", "title", "link", "status", "filename", "error"];

/// Screening log columns.
pub const SCREENING_HEADER: &[&str] = &[
    "filename",
    "score",
    "decision",
    "reasoning",
    "moved_to",
    "suggested_citation",
];

/// An append-only CSV log with a fixed column set.
pub struct AuditLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl AuditLog {
    /// Open (or create) a log, writing `header` if the file is new or empty.
    pub fn open(path: impl AsRef<Path>, header: &[&str]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_new {
            writer.write_record(header)?;
            writer.flush()?;
        }

        Ok(Self { path, writer })
    }

    /// Append one record and flush it to disk immediately.
    pub fn append<R: Serialize>(&mut self, record: &R) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Links recorded as `success` in an existing retrieval log.
///
/// A missing log yields an empty set.
pub fn successful_links(path: impl AsRef<Path>) -> Result<HashSet<String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut links = HashSet::new();
    for record in reader.records() {
        let record = record?;
        let (Some(link), Some(status)) = (record.get(2), record.get(3)) else {
            continue;
        };
        if status.eq_ignore_ascii_case("success") {
            links.insert(link.to_string());
        }
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateArticle, RetrievalOutcome};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn candidate(link: &str) -> CandidateArticle {
        CandidateArticle {
            repo_id: "R1".to_string(),
            repo_name: "RepoA".to_string(),
            query: "term1".to_string(),
            title: "Study, of \"X\"".to_string(),
            link: link.to_string(),
            collected_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("download_log.csv");

        {
            let mut log = AuditLog::open(&path, RETRIEVAL_HEADER).unwrap();
            log.append(&RetrievalOutcome::success(&candidate("https://r/handle/1/1"), "a.pdf"))
                .unwrap();
        }
        {
            let mut log = AuditLog::open(&path, RETRIEVAL_HEADER).unwrap();
            log.append(&RetrievalOutcome::failed(&candidate("https://r/handle/1/2"), "status 404"))
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "repo_id,title,link,status,filename,error");
        assert_eq!(
            lines[1],
            r#"R1,"Study, of ""X""",https://r/handle/1/1,success,a.pdf,"#
        );
        assert_eq!(
            lines[2],
            r#"R1,"Study, of ""X""",https://r/handle/1/2,failed,,status 404"#
        );
    }

    #[test]
    fn test_discovery_row_matches_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("candidates.csv");
        let mut log = AuditLog::open(&path, DISCOVERY_HEADER).unwrap();
        log.append(&candidate("https://r/handle/1/1")).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(headers.len(), row.len());
        assert_eq!(&row[4], "https://r/handle/1/1");
    }

    #[test]
    fn test_successful_links() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("download_log.csv");
        let mut log = AuditLog::open(&path, RETRIEVAL_HEADER).unwrap();
        log.append(&RetrievalOutcome::success(&candidate("https://r/ok"), "a.pdf"))
            .unwrap();
        log.append(&RetrievalOutcome::failed(&candidate("https://r/bad"), "boom"))
            .unwrap();

        let links = successful_links(&path).unwrap();
        assert_eq!(links.len(), 1);
        assert!(links.contains("https://r/ok"));
    }

    #[test]
    fn test_successful_links_missing_file() {
        let dir = tempdir().unwrap();
        assert!(successful_links(dir.path().join("none.csv")).unwrap().is_empty());
    }
}
