//! Relevance screening of downloaded PDFs.
//!
//! A bounded excerpt of each document is sent to a text classifier; the
//! parsed answer decides which outcome directory the file is moved to.

pub mod client;
pub mod decision;
pub mod extract;
pub mod prompt;
pub mod screener;
pub mod year;

pub use client::{build_classifier, AnthropicClient, ClassifierClient, GeminiClient};
pub use decision::{
    parse_response, strip_fences, Assessment, Destination, ERROR_VERDICT, SKIPPED_VERDICT,
};
pub use extract::{PageText, PageWindow, PdfTextExtractor, TextExtractor};
pub use screener::{
    pdf_files, ScreeningDecision, ScreeningOutcome, ScreeningRecord, ScreeningSettings, Screener,
    SkipReason,
};
pub use year::{detect_year, YearRange};
