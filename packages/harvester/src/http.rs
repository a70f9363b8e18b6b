//! HTTP fetcher shared by discovery and retrieval.
//!
//! Every request goes out with the same browser-like identity and relaxed
//! TLS verification: many institutional repositories run self-signed or
//! expired certificates.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::config::USER_AGENT;
use crate::error::{HarvesterError, Result};

/// A fetched HTML (or other text) page.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL after redirects; relative links on the page resolve against it.
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

/// HTTP GET primitive with fixed identity and timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    /// Issue a GET and require HTTP 200.
    ///
    /// Non-200 answers become [`HarvesterError::Status`]; nothing is retried.
    pub async fn get(&self, url: &Url) -> Result<Response> {
        tracing::debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(HarvesterError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// GET a page and read its body as text.
    pub async fn get_page(&self, url: &Url) -> Result<Page> {
        let response = self.get(url).await?;
        let final_url = response.url().clone();
        let content_type = content_type(&response);
        let body = response.text().await?;
        Ok(Page {
            url: final_url,
            content_type,
            body,
        })
    }
}

/// Lowercased media type of a response, without parameters.
pub fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(media_type)
}

/// Strip parameters (`; charset=...`) from a content type header value.
///
/// # Examples
/// ```
/// use litscout_harvester::http::media_type;
///
/// assert_eq!(media_type("text/HTML; charset=UTF-8"), "text/html");
/// ```
pub fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether a media type denotes an HTML page rather than a document.
#[must_use]
pub fn is_html(media_type: &str) -> bool {
    media_type == "text/html" || media_type == "application/xhtml+xml"
}
