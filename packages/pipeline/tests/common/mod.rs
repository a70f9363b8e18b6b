#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use litscout_pipeline::error::{PipelineError, Result};
use litscout_pipeline::screening::{ClassifierClient, PageText, PageWindow, TextExtractor};
use litscout_pipeline::PoolSettings;

/// Classifier answering by file content: the prompt excerpt is matched
/// against `rules` in order, first hit wins.
pub struct RuleClassifier {
    rules: Vec<(&'static str, Result<String>)>,
    pub prompts: Mutex<Vec<String>>,
}

impl RuleClassifier {
    pub fn new(rules: Vec<(&'static str, Result<String>)>) -> Self {
        Self {
            rules,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ClassifierClient for RuleClassifier {
    async fn classify(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        for (needle, answer) in &self.rules {
            if prompt.contains(needle) {
                return match answer {
                    Ok(text) => Ok(text.clone()),
                    Err(e) => Err(PipelineError::ClassifierApi {
                        status: 500,
                        message: e.to_string(),
                    }),
                };
            }
        }
        Err(PipelineError::ClassifierEmptyResponse)
    }
}

/// Uses the file's bytes as its only page of text.
pub struct RawTextExtractor;

#[async_trait]
impl TextExtractor for RawTextExtractor {
    async fn extract(&self, path: &Path, _window: PageWindow) -> Result<PageText> {
        let text = std::fs::read_to_string(path)?;
        Ok(PageText {
            head: text,
            tail: String::new(),
        })
    }
}

pub fn fast_pool(concurrency: usize) -> PoolSettings {
    PoolSettings {
        concurrency,
        delay: Duration::ZERO,
    }
}

/// Data rows of a CSV log (header excluded).
pub fn log_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}
