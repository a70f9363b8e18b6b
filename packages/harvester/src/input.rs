//! Input batch readers.
//!
//! Batches are CSV files with an optional header row. The header is detected
//! by comparing the first cell with a known column name, case-insensitively.

use std::path::Path;

use crate::config::normalize_base_url;
use crate::error::{HarvesterError, Result};
use crate::types::{CandidateArticle, SourceRepository};

/// First-cell values that mark a header row.
const HEADER_TOKENS: &[&str] = &["repo_id", "id"];

/// Column layout of the wide registry export (id, ..., name, url, ...).
const REGISTRY_ID_COL: usize = 0;
const REGISTRY_NAME_COL: usize = 8;
const REGISTRY_URL_COL: usize = 9;

fn is_header(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .map(|cell| {
            let cell = cell.trim().trim_start_matches('\u{feff}');
            HEADER_TOKENS.iter().any(|t| cell.eq_ignore_ascii_case(t))
        })
        .unwrap_or(false)
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| HarvesterError::InvalidInput(format!("cannot read {}: {e}", path.display())))
}

/// Read candidate rows `(repo_id, repo_name, query, title, link[, collected_at])`.
///
/// Rows with fewer than five cells are skipped.
pub fn read_candidates(path: impl AsRef<Path>) -> Result<Vec<CandidateArticle>> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let mut candidates = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if i == 0 && is_header(&record) {
            continue;
        }
        if record.len() < 5 {
            tracing::debug!(row = i + 1, file = %path.display(), "skipping short row");
            continue;
        }
        let cell = |n: usize| record.get(n).unwrap_or_default().trim().to_string();
        candidates.push(CandidateArticle {
            repo_id: cell(0),
            repo_name: cell(1),
            query: cell(2),
            title: cell(3),
            link: cell(4),
            collected_at: cell(5),
        });
    }

    Ok(candidates)
}

/// Read repositories from either `(id, name, base_url)` rows or the wide
/// registry export (id in column 0, name in column 8, URL in column 9).
///
/// Rows without a usable URL are skipped.
pub fn read_repositories(path: impl AsRef<Path>) -> Result<Vec<SourceRepository>> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let mut repos = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        if i == 0 && is_header(&record) {
            continue;
        }

        let (id_col, name_col, url_col) = if record.len() > REGISTRY_URL_COL {
            (REGISTRY_ID_COL, REGISTRY_NAME_COL, REGISTRY_URL_COL)
        } else if record.len() >= 3 {
            (0, 1, 2)
        } else {
            tracing::debug!(row = i + 1, file = %path.display(), "skipping short row");
            continue;
        };

        let raw_url = record.get(url_col).unwrap_or_default().trim();
        if raw_url.is_empty() {
            continue;
        }

        match normalize_base_url(raw_url) {
            Ok(base_url) => repos.push(SourceRepository::new(
                record.get(id_col).unwrap_or_default().trim(),
                record.get(name_col).unwrap_or_default().trim(),
                base_url,
            )),
            Err(e) => {
                tracing::warn!(row = i + 1, error = %e, "skipping repository with invalid URL");
            }
        }
    }

    Ok(repos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_candidates_with_header() {
        let file = csv_file(
            "repo_id,repo_name,query,title,link,collected_at\n\
             R1,RepoA,term1,Study of X,https://repo.example/handle/1/1,2026-01-01T00:00:00Z\n",
        );
        let candidates = read_candidates(file.path()).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Study of X");
        assert_eq!(candidates[0].collected_at, "2026-01-01T00:00:00Z");
    }

    #[test]
    fn test_read_candidates_without_header() {
        let file = csv_file(
            "R1,RepoA,term1,Study of X,https://repo.example/handle/1/1\n\
             short,row\n\
             R2,RepoB,term2,Other,https://other.example/handle/2/2\n",
        );
        let candidates = read_candidates(file.path()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].repo_id, "R1");
        assert_eq!(candidates[0].collected_at, "");
        assert_eq!(candidates[1].link, "https://other.example/handle/2/2");
    }

    #[test]
    fn test_header_detection_is_case_insensitive() {
        let file = csv_file("REPO_ID,name,query,title,link\nR1,A,t,T,https://r/handle/1/1\n");
        assert_eq!(read_candidates(file.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_read_repositories_short_form() {
        let file = csv_file(
            "id,name,url\n\
             R1,RepoA,https://repo.example/riuff\n\
             R2,RepoB,\n\
             R3,RepoC,not a url\n",
        );
        let repos = read_repositories(file.path()).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].id, "R1");
        assert_eq!(repos[0].base_url.as_str(), "https://repo.example/riuff/");
    }

    #[test]
    fn test_read_repositories_registry_export() {
        let file = csv_file(
            "id,a,b,c,d,e,f,g,nome,url,extra\n\
             42,x,x,x,x,x,x,x,Repositório UFF,https://app.uff.br/riuff,y\n",
        );
        let repos = read_repositories(file.path()).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].id, "42");
        assert_eq!(repos[0].name, "Repositório UFF");
        assert_eq!(repos[0].base_url.as_str(), "https://app.uff.br/riuff/");
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let err = read_candidates("/nonexistent/batch.csv").unwrap_err();
        assert!(matches!(err, HarvesterError::InvalidInput(_)));
    }
}
