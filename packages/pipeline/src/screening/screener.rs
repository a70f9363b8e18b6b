use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::fs;

use crate::config::ScreeningConfig;
use crate::error::{PipelineError, Result};
use crate::screening::client::ClassifierClient;
use crate::screening::decision::{
    parse_response, Assessment, Destination, ERROR_VERDICT, OUT_OF_RANGE_VERDICT,
    SKIPPED_VERDICT,
};
use crate::screening::extract::{PageWindow, TextExtractor};
use crate::screening::prompt;
use crate::screening::year::{detect_year, YearRange};

const MOVE_ATTEMPTS: u32 = 3;
const MOVE_BACKOFF: Duration = Duration::from_millis(500);

/// Everything the screener needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ScreeningSettings {
    pub topic: String,
    pub criteria: String,
    pub prompt_template: String,
    pub max_file_bytes: u64,
    pub window: PageWindow,
    pub excerpt_chars: usize,
    pub score_threshold: u8,
    pub match_dir: String,
    pub no_match_dir: String,
    pub years: YearRange,
}

impl ScreeningSettings {
    /// Settings from config, with optional command-line topic and exclusions.
    pub fn from_config(
        config: &ScreeningConfig,
        topic: Option<&str>,
        exclude: Option<&str>,
    ) -> Self {
        Self {
            topic: topic.unwrap_or(&config.topic).to_string(),
            criteria: prompt::combine_criteria(exclude, &config.exclusion_criteria),
            prompt_template: config.prompt_template.clone(),
            max_file_bytes: config.max_file_bytes(),
            window: PageWindow::new(config.head_pages, config.tail_pages),
            excerpt_chars: config.excerpt_chars,
            score_threshold: config.score_threshold,
            match_dir: config.match_dir.clone(),
            no_match_dir: config.no_match_dir.clone(),
            years: YearRange::new(config.min_year, config.max_year),
        }
    }
}

/// A filed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreeningDecision {
    pub filename: String,
    pub score: Option<u8>,
    pub verdict: String,
    pub justification: String,
    /// Outcome directory name the file now lives in.
    pub moved_to: String,
    pub suggested_citation: Option<String>,
    pub publication_year: Option<u16>,
}

impl ScreeningDecision {
    pub fn record(&self) -> ScreeningRecord<'_> {
        ScreeningRecord {
            filename: &self.filename,
            score: self.score.map(|s| s.to_string()).unwrap_or_default(),
            decision: &self.verdict,
            reasoning: Cow::Borrowed(self.justification.as_str()),
            moved_to: &self.moved_to,
            suggested_citation: self.suggested_citation.as_deref().unwrap_or_default(),
        }
    }
}

/// One screening-log row.
#[derive(Debug, Serialize)]
pub struct ScreeningRecord<'a> {
    pub filename: &'a str,
    pub score: String,
    pub decision: &'a str,
    pub reasoning: Cow<'a, str>,
    pub moved_to: &'a str,
    pub suggested_citation: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge { size: u64 },
}

/// Result of screening one file.
#[derive(Debug)]
pub enum ScreeningOutcome {
    Filed(ScreeningDecision),
    Skipped { filename: String, reason: SkipReason },
    /// The file stays where it was and is picked up by the next run.
    ///
    /// `assessment` is set when the classifier answered but the move failed.
    Failed {
        filename: String,
        error: String,
        assessment: Option<Assessment>,
    },
}

impl ScreeningOutcome {
    pub fn filename(&self) -> &str {
        match self {
            ScreeningOutcome::Filed(d) => &d.filename,
            ScreeningOutcome::Skipped { filename, .. } | ScreeningOutcome::Failed { filename, .. } => {
                filename
            }
        }
    }

    /// The screening-log row for this outcome. Files that were not moved
    /// have an empty `moved_to`.
    pub fn record(&self) -> ScreeningRecord<'_> {
        match self {
            ScreeningOutcome::Filed(decision) => decision.record(),
            ScreeningOutcome::Skipped {
                filename,
                reason: SkipReason::TooLarge { size },
            } => ScreeningRecord {
                filename,
                score: String::new(),
                decision: SKIPPED_VERDICT,
                reasoning: Cow::Owned(format!("file too large: {size} bytes")),
                moved_to: "",
                suggested_citation: "",
            },
            ScreeningOutcome::Failed {
                filename,
                error,
                assessment,
            } => {
                let reasoning = match assessment {
                    Some(a) => Cow::Owned(format!("{error} (classifier verdict: {})", a.verdict)),
                    None => Cow::Borrowed(error.as_str()),
                };
                ScreeningRecord {
                    filename,
                    score: assessment
                        .as_ref()
                        .and_then(|a| a.score)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    decision: ERROR_VERDICT,
                    reasoning,
                    moved_to: "",
                    suggested_citation: assessment
                        .as_ref()
                        .and_then(|a| a.citation.as_deref())
                        .unwrap_or_default(),
                }
            }
        }
    }
}

/// Screens PDFs in a directory and files them into outcome subdirectories.
pub struct Screener {
    classifier: Arc<dyn ClassifierClient>,
    extractor: Arc<dyn TextExtractor>,
    settings: ScreeningSettings,
}

impl Screener {
    pub fn new(
        classifier: Arc<dyn ClassifierClient>,
        extractor: Arc<dyn TextExtractor>,
        settings: ScreeningSettings,
    ) -> Self {
        Self {
            classifier,
            extractor,
            settings,
        }
    }

    pub fn settings(&self) -> &ScreeningSettings {
        &self.settings
    }

    /// Screen one PDF. Never returns an error; failures become
    /// [`ScreeningOutcome::Failed`].
    pub async fn screen(&self, pdf: &Path) -> ScreeningOutcome {
        let filename = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.try_screen(pdf, &filename).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(file = %filename, error = %e, "screening failed, file left in place");
                ScreeningOutcome::Failed {
                    filename,
                    error: e.to_string(),
                    assessment: None,
                }
            }
        }
    }

    async fn try_screen(&self, pdf: &Path, filename: &str) -> Result<ScreeningOutcome> {
        let s = &self.settings;

        let size = fs::metadata(pdf).await?.len();
        if size > s.max_file_bytes {
            tracing::info!(file = %filename, size, limit = s.max_file_bytes, "skipped, file too large");
            return Ok(ScreeningOutcome::Skipped {
                filename: filename.to_string(),
                reason: SkipReason::TooLarge { size },
            });
        }

        let excerpt = self
            .extractor
            .extract(pdf, s.window)
            .await?
            .excerpt(s.excerpt_chars);
        let year = detect_year(&excerpt);

        let (assessment, destination) = match year {
            Some(y) if !s.years.contains(y) => {
                tracing::info!(file = %filename, year = y, range = %s.years, "publication year out of range");
                let assessment = Assessment {
                    score: None,
                    verdict: OUT_OF_RANGE_VERDICT.to_string(),
                    reasoning: format!("publication year {y} outside {}", s.years),
                    citation: None,
                };
                (assessment, Destination::NoMatch)
            }
            _ => {
                let prompt = prompt::render(&s.prompt_template, &s.topic, &s.criteria, &excerpt);
                let raw = self.classifier.classify(&prompt).await?;
                let assessment = parse_response(&raw);
                let destination = assessment.destination(s.score_threshold);
                (assessment, destination)
            }
        };

        let dir_name = match destination {
            Destination::Match => &s.match_dir,
            Destination::NoMatch => &s.no_match_dir,
        };
        let target = pdf
            .parent()
            .unwrap_or(Path::new("."))
            .join(dir_name)
            .join(filename);
        if let Err(e) = move_with_retry(pdf, &target).await {
            tracing::warn!(file = %filename, decision = %assessment.verdict, error = %e, "classified but not moved");
            return Ok(ScreeningOutcome::Failed {
                filename: filename.to_string(),
                error: e.to_string(),
                assessment: Some(assessment),
            });
        }

        tracing::info!(
            file = %filename,
            score = ?assessment.score,
            decision = %assessment.verdict,
            moved_to = %dir_name,
            "screened"
        );

        Ok(ScreeningOutcome::Filed(ScreeningDecision {
            filename: filename.to_string(),
            score: assessment.score,
            verdict: assessment.verdict,
            justification: assessment.reasoning,
            moved_to: dir_name.clone(),
            suggested_citation: assessment.citation,
            publication_year: year,
        }))
    }
}

/// Rename `from` to `to`, creating the target directory, with a fixed
/// number of attempts.
pub async fn move_with_retry(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut attempt = 1;
    loop {
        match fs::rename(from, to).await {
            Ok(()) => return Ok(()),
            Err(source) if attempt >= MOVE_ATTEMPTS => {
                return Err(PipelineError::MoveFailed {
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                    attempts: attempt,
                    source,
                });
            }
            Err(e) => {
                tracing::debug!(from = %from.display(), attempt, error = %e, "move failed, retrying");
                tokio::time::sleep(MOVE_BACKOFF).await;
                attempt += 1;
            }
        }
    }
}

/// Top-level `.pdf` files in `dir` (case-insensitive extension), sorted by name.
pub async fn pdf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| {
        PipelineError::InvalidInput(format!("cannot read directory {}: {e}", dir.display()))
    })?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
