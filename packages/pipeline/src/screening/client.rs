use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ClassifierConfig, Provider};
use crate::error::{PipelineError, Result};

/// A text classifier: one prompt in, raw model text out.
///
/// Parsing the text into a decision is the caller's job, so implementations
/// stay thin and mockable.
#[async_trait]
pub trait ClassifierClient: Send + Sync {
    async fn classify(&self, prompt: &str) -> Result<String>;
}

/// Build the client for the configured provider.
pub fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn ClassifierClient>> {
    let client: Arc<dyn ClassifierClient> = match config.provider {
        Provider::Gemini => Arc::new(GeminiClient::new(config)?),
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)?),
    };
    Ok(client)
}

fn http_client(config: &ClassifierConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(PipelineError::ClassifierRequest)
}

/// Read a non-200 body into an API error, preferring the provider's message.
async fn api_error(resp: reqwest::Response) -> PipelineError {
    let status = resp.status().as_u16();
    let body_text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body_text)
        .ok()
        .and_then(|r| r.error)
        .map(|e| e.message)
        .unwrap_or(body_text);
    PipelineError::ClassifierApi { status, message }
}

/// Both providers wrap errors as `{"error": {"message": ...}}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Google Generative Language `generateContent` client.
///
/// NOTE: Do NOT derive `Debug` on this struct, `api_key` would be exposed.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    api_base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            api_key: config.resolved_api_key()?,
            api_base_url: config.base_url(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ClassifierClient for GeminiClient {
    async fn classify(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base_url, self.model
        );
        let body = GeminiRequest {
            contents: [GeminiContent {
                parts: [GeminiPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: 0.0,
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "sending gemini request");
        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if resp.status().as_u16() != 200 {
            return Err(api_error(resp).await);
        }

        let api_response: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::ClassifierResponseParse(e.to_string()))?;

        let content = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(PipelineError::ClassifierEmptyResponse);
        }
        Ok(content)
    }
}

/// Anthropic Messages API client.
///
/// NOTE: Do NOT derive `Debug` on this struct, `api_key` would be exposed.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    api_base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

impl AnthropicClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            api_key: config.resolved_api_key()?,
            api_base_url: config.base_url(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ClassifierClient for AnthropicClient {
    async fn classify(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.api_base_url);
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: 0.0,
            messages: [AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "sending anthropic request");
        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if resp.status().as_u16() != 200 {
            return Err(api_error(resp).await);
        }

        let api_response: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::ClassifierResponseParse(e.to_string()))?;

        let content = api_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(PipelineError::ClassifierEmptyResponse);
        }
        Ok(content)
    }
}

/// Test utilities for the classifier client.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Mock classifier. Returns pre-configured responses in order and records
    /// every prompt it receives.
    pub struct MockClassifier {
        responses: Mutex<Vec<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockClassifier {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            // Reverse so we can pop from the end
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn with_responses(contents: Vec<&str>) -> Self {
            Self::new(contents.into_iter().map(|c| Ok(c.to_string())).collect())
        }

        pub fn with_response(content: &str) -> Self {
            Self::with_responses(vec![content])
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ClassifierClient for MockClassifier {
        async fn classify(&self, prompt: &str) -> Result<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            let mut responses = self.responses.lock().map_err(|e| {
                PipelineError::ClassifierResponseParse(format!("mock lock poisoned: {e}"))
            })?;
            responses
                .pop()
                .unwrap_or(Err(PipelineError::ClassifierEmptyResponse))
        }
    }
}
