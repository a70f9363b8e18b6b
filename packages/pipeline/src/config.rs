//! TOML configuration for the `litscout` binary.
//!
//! The file is parsed into explicit structs (unknown keys are rejected) and
//! validated before any work is dispatched, so a typo fails the run instead
//! of silently falling back to a default.

use std::path::Path;
use std::time::Duration;

use litscout_harvester::config::{
    DEFAULT_ENDPOINTS, DEFAULT_ITEM_MARKER, DEFAULT_PAGE_SIZE, DOWNLOAD_TIMEOUT_SECS,
    SEARCH_TIMEOUT_SECS,
};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Environment variable consulted when `classifier.api_key` is absent.
pub const API_KEY_ENV: &str = "LLM_API_KEY";

/// Default config path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "litscout.toml";

const MB: u64 = 1024 * 1024;

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are screening documents for a systematic literature review.

Research topic: {{topic}}

Exclusion criteria:
{{criteria}}

Document excerpt (first page and last pages):
"""
{{text}}
"""

Answer with a single JSON object and nothing else:
{"relevance_score": <0-100>, "decision": "YES" or "NO", "reasoning": "<one or two sentences>", "most_relevant_citation": {"title": "<title>", "author": "<author>"}}"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub harvest: HarvestConfig,
    pub screening: ScreeningConfig,
    /// Only required by the `screen` command.
    pub classifier: Option<ClassifierConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HarvestConfig {
    pub search_terms: Vec<String>,
    pub endpoints: Vec<String>,
    pub item_marker: String,
    pub page_size: u32,
    pub concurrency: usize,
    pub delay_ms: u64,
    pub search_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub max_download_mb: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            search_terms: Vec::new(),
            endpoints: DEFAULT_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            item_marker: DEFAULT_ITEM_MARKER.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            concurrency: 5,
            delay_ms: 1000,
            search_timeout_secs: SEARCH_TIMEOUT_SECS,
            download_timeout_secs: DOWNLOAD_TIMEOUT_SECS,
            max_download_mb: 100,
        }
    }
}

impl HarvestConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn max_download_bytes(&self) -> u64 {
        self.max_download_mb.saturating_mul(MB)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScreeningConfig {
    pub topic: String,
    pub exclusion_criteria: String,
    pub prompt_template: String,
    pub max_file_mb: u64,
    pub head_pages: usize,
    pub tail_pages: usize,
    pub excerpt_chars: usize,
    pub score_threshold: u8,
    pub match_dir: String,
    pub no_match_dir: String,
    pub min_year: Option<u16>,
    pub max_year: Option<u16>,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            topic: "General Research".to_string(),
            exclusion_criteria: String::new(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_file_mb: 30,
            head_pages: 1,
            tail_pages: 2,
            excerpt_chars: 4000,
            score_threshold: 70,
            match_dir: "relevant".to_string(),
            no_match_dir: "irrelevant".to_string(),
            min_year: None,
            max_year: None,
        }
    }
}

impl ScreeningConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb.saturating_mul(MB)
    }
}

/// Classifier backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Anthropic,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }
}

/// NOTE: `Debug` is implemented by hand so the API key never reaches logs.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    pub provider: Provider,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_classifier_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

impl std::fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ClassifierConfig {
    /// Configured key, or the `LLM_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "classifier.api_key is not set and {API_KEY_ENV} is empty"
                ))
            })
    }

    pub fn base_url(&self) -> String {
        self.api_base_url
            .as_deref()
            .unwrap_or(self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`. A missing file at the default location yields the
    /// defaults; a missing explicitly named file is an error.
    pub fn load(path: &Path, explicit: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(PipelineError::ConfigRead {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Checks shared by every command.
    pub fn validate(&self) -> Result<()> {
        let h = &self.harvest;
        if h.endpoints.is_empty() {
            return Err(config_error("harvest.endpoints must not be empty"));
        }
        if let Some(bad) = h.endpoints.iter().find(|e| !e.starts_with('/')) {
            return Err(config_error(format!(
                "harvest.endpoints entry {bad:?} must start with '/'"
            )));
        }
        if h.item_marker.trim().is_empty() {
            return Err(config_error("harvest.item_marker must not be empty"));
        }
        if h.page_size == 0 {
            return Err(config_error("harvest.page_size must be at least 1"));
        }
        if h.concurrency == 0 {
            return Err(config_error("harvest.concurrency must be at least 1"));
        }
        if h.search_timeout_secs == 0 || h.download_timeout_secs == 0 {
            return Err(config_error("harvest timeouts must be at least 1 second"));
        }
        if h.max_download_mb == 0 {
            return Err(config_error("harvest.max_download_mb must be at least 1"));
        }

        let s = &self.screening;
        if s.max_file_mb == 0 {
            return Err(config_error("screening.max_file_mb must be at least 1"));
        }
        if s.head_pages + s.tail_pages == 0 {
            return Err(config_error(
                "screening.head_pages and screening.tail_pages cannot both be 0",
            ));
        }
        if s.excerpt_chars == 0 {
            return Err(config_error("screening.excerpt_chars must be at least 1"));
        }
        if s.score_threshold > 100 {
            return Err(config_error("screening.score_threshold must be within 0-100"));
        }
        if !s.prompt_template.contains("{{text}}") {
            return Err(config_error(
                "screening.prompt_template must contain the {{text}} placeholder",
            ));
        }
        if s.match_dir.trim().is_empty() || s.no_match_dir.trim().is_empty() {
            return Err(config_error("screening outcome directories must not be empty"));
        }
        if s.match_dir == s.no_match_dir {
            return Err(config_error(
                "screening.match_dir and screening.no_match_dir must differ",
            ));
        }
        if let (Some(min), Some(max)) = (s.min_year, s.max_year) {
            if min > max {
                return Err(config_error(format!(
                    "screening.min_year ({min}) is after screening.max_year ({max})"
                )));
            }
        }

        if let Some(c) = &self.classifier {
            if c.model.trim().is_empty() {
                return Err(config_error("classifier.model must not be empty"));
            }
            if c.timeout_secs == 0 {
                return Err(config_error("classifier.timeout_secs must be at least 1"));
            }
            if c.max_tokens == 0 {
                return Err(config_error("classifier.max_tokens must be at least 1"));
            }
        }

        Ok(())
    }

    /// Classifier settings, required by the `screen` command.
    pub fn require_classifier(&self) -> Result<&ClassifierConfig> {
        self.classifier
            .as_ref()
            .ok_or_else(|| config_error("a [classifier] section is required for screening"))
    }
}

fn config_error(message: impl Into<String>) -> PipelineError {
    PipelineError::Config(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = PipelineConfig::parse("").unwrap();
        assert_eq!(config.harvest.concurrency, 5);
        assert_eq!(config.harvest.delay_ms, 1000);
        assert_eq!(config.harvest.endpoints.len(), 4);
        assert_eq!(config.screening.score_threshold, 70);
        assert_eq!(config.screening.max_file_bytes(), 30 * 1024 * 1024);
        assert!(config.classifier.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_full_document() {
        let config = PipelineConfig::parse(
            r#"
            [harvest]
            search_terms = ["bebida fermentada", "caju"]
            concurrency = 3
            delay_ms = 250

            [screening]
            topic = "Cashew beverages"
            min_year = 2000
            max_year = 2024

            [classifier]
            provider = "anthropic"
            model = "some-model"
            api_key = "secret"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.harvest.search_terms, vec!["bebida fermentada", "caju"]);
        assert_eq!(config.harvest.delay(), Duration::from_millis(250));
        assert_eq!(config.screening.min_year, Some(2000));

        let classifier = config.require_classifier().unwrap();
        assert_eq!(classifier.provider, Provider::Anthropic);
        assert_eq!(classifier.base_url(), "https://api.anthropic.com");
        assert_eq!(classifier.resolved_api_key().unwrap(), "secret");
        assert_eq!(classifier.timeout_secs, 60);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config =
            PipelineConfig::parse(include_str!("../../../litscout.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.require_classifier().unwrap().provider, Provider::Gemini);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = PipelineConfig::parse("[harvest]\nconcurency = 3\n").unwrap_err();
        assert!(err.to_string().contains("concurency"), "{err}");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = PipelineConfig::parse("[classifier]\nprovider = \"openai\"\nmodel = \"m\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_names_field() {
        let mut config = PipelineConfig::default();
        config.harvest.concurrency = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("harvest.concurrency"), "{err}");

        let mut config = PipelineConfig::default();
        config.screening.min_year = Some(2020);
        config.screening.max_year = Some(2010);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_year"), "{err}");

        let mut config = PipelineConfig::default();
        config.screening.prompt_template = "no placeholder".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.harvest.endpoints = vec!["discover".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_classifier_section() {
        let err = PipelineConfig::default().require_classifier().unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = PipelineConfig::parse(
            "[classifier]\nprovider = \"gemini\"\nmodel = \"m\"\napi_key = \"top-secret\"\n",
        )
        .unwrap();
        let debug = format!("{:?}", config.classifier);
        assert!(!debug.contains("top-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let config = PipelineConfig::parse(
            "[classifier]\nprovider = \"gemini\"\nmodel = \"m\"\napi_base_url = \"http://localhost:9000/\"\n",
        )
        .unwrap();
        assert_eq!(
            config.classifier.unwrap().base_url(),
            "http://localhost:9000"
        );
    }

    #[test]
    fn test_load_missing_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("litscout.toml");
        assert!(PipelineConfig::load(&path, false).is_ok());
        assert!(matches!(
            PipelineConfig::load(&path, true),
            Err(PipelineError::ConfigRead { .. })
        ));
    }
}
