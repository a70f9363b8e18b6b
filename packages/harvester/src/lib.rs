//! litscout harvester - discover and download full-text PDFs from
//! institutional repositories.
//!
//! # Example
//!
//! ```
//! use litscout_harvester::config::{normalize_base_url, pdf_filename};
//!
//! let base = normalize_base_url("https://repo.example/jspui").unwrap();
//! assert_eq!(base.as_str(), "https://repo.example/jspui/");
//! assert_eq!(pdf_filename("R1", "Study of X"), "R1_Study_of_X.pdf");
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Constants, URL normalization, filename derivation
//! - [`types`]: Repositories, candidates, retrieval outcomes
//! - [`error`]: Error types and Result alias
//! - [`http`]: The shared HTTP fetcher
//! - [`links`]: Rule-based link extraction
//! - [`query`]: Repository query engine and search strategies
//! - [`resolver`]: Item page to PDF URL resolution
//! - [`download`]: Idempotent downloader and per-candidate retriever
//! - [`audit`]: Append-only CSV logs
//! - [`input`]: Input batch readers

pub mod audit;
pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod input;
pub mod links;
pub mod query;
pub mod resolver;
pub mod types;

pub use download::{Downloader, Retriever};
pub use error::{HarvesterError, Result};
pub use http::Fetcher;
pub use query::{QueryEngine, SearchStrategy};
pub use resolver::PdfResolver;
pub use types::{
    CandidateArticle, Resolution, ResolvedTarget, RetrievalOutcome, RetrievalStatus,
    SourceRepository,
};
