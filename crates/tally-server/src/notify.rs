// Notification sink implementations: an outbound webhook poster and a
// log-only fallback for deployments without a configured URL.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;
use tracing::{debug, info};

use tally_core::Notifier;

/// Posts rendered leaderboard text as `{"text": ...}` JSON to a fixed
/// webhook URL.
pub(crate) struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl WebhookNotifier {
    pub fn new(url: &str, headers: &HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.to_string(),
            headers: parse_headers(headers)?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("notification webhook returned {}", status);
        }

        debug!(url = %self.url, status = %status, "delivered notification");
        Ok(())
    }
}

/// Fallback sink: the rendered message goes to the process log.
pub(crate) struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        info!("leaderboard publication (no webhook configured):\n{}", text);
        Ok(())
    }
}

/// Parse a HashMap of string headers into a HeaderMap
fn parse_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::try_from(key.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid header name '{}': {}", key, e))?;
        let val = HeaderValue::from_str(value)
            .map_err(|e| anyhow::anyhow!("Invalid header value for '{}': {}", key, e))?;
        header_map.insert(name, val);
    }
    Ok(header_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers_accepts_valid_pairs() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "Bearer token123".to_string());
        headers.insert("X-Custom-Header".to_string(), "custom-value".to_string());

        let header_map = parse_headers(&headers).unwrap();
        assert_eq!(header_map.len(), 2);
        assert_eq!(header_map.get("Authorization").unwrap(), "Bearer token123");
        assert_eq!(header_map.get("X-Custom-Header").unwrap(), "custom-value");
    }

    #[test]
    fn parse_headers_rejects_invalid_names() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "value".to_string());
        assert!(parse_headers(&headers).is_err());
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send("Leaderboard\n1. alice - 1").await.is_ok());
    }
}
