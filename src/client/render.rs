//! Client for a Browserless-compatible `/content` rendering API.
//!
//! The fallback transport: a headless browser service that executes
//! client-side rendering and returns the final HTML, used when the
//! lightweight path trips bot detection.

use std::time::Duration;

use crate::error::{AppError, Result};

/// HTTP client for the rendering service `/content` endpoint.
#[derive(Debug, Clone)]
pub struct RenderClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RenderClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Fetch fully-rendered HTML content for a URL.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({ "url": url });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(AppError::transport(
                url,
                format!("render service returned {}: {}", status.as_u16(), message),
            ));
        }

        Ok(resp.text().await?)
    }
}
