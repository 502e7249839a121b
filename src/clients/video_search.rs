use crate::cache::MemoCache;
use crate::constants;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One provider result. `duration` is in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchVideo {
    pub title: String,
    pub link: String,
    pub duration: f64,
}

/// Video search provider seam; the find strategy only sees this. Tests plug
/// in a canned implementation.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchVideo>>;
}

#[derive(Debug, Deserialize)]
struct RawVideo {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "videoId")]
    video_id: String,
    #[serde(default, rename = "lengthSeconds")]
    length_seconds: f64,
}

/// Invidious-compatible search endpoint, optionally memoized: responses are
/// idempotent GETs, so the compressed cache can absorb them wholesale.
pub struct InvidiousClient {
    client: reqwest::Client,
    endpoint: String,
    cache: Option<Arc<MemoCache>>,
}

impl InvidiousClient {
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        cache: Option<Arc<MemoCache>>,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(constants::USER_AGENT)
                .timeout(timeout)
                .build()?,
            endpoint: endpoint.to_string(),
            cache,
        })
    }

    async fn fetch_body(&self, query: &str) -> Result<String> {
        let url = format!(
            "{}?q={}&type=video",
            self.endpoint,
            urlencoding::encode(query)
        );
        debug!("Video search: GET {}", url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    fn parse(body: &str) -> Result<Vec<SearchVideo>> {
        let raw: Vec<RawVideo> =
            serde_json::from_str(body).context("parsing video search response")?;
        Ok(raw
            .into_iter()
            .filter(|v| (v.kind.is_empty() || v.kind == "video") && !v.video_id.is_empty())
            .map(|v| SearchVideo {
                title: v.title,
                link: format!("https://www.youtube.com/watch?v={}", v.video_id),
                duration: v.length_seconds,
            })
            .collect())
    }
}

#[async_trait]
impl VideoSearch for InvidiousClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchVideo>> {
        let body = match &self.cache {
            Some(cache) => {
                let key = format!("search:{query}");
                cache
                    .get_or_fetch(&key, || async {
                        self.fetch_body(query).await.map(Some)
                    })
                    .await?
                    .unwrap_or_default()
            }
            None => self.fetch_body(query).await?,
        };
        Self::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_payload() {
        let body = r#"[
            {"type": "video", "title": "Show OP 1", "videoId": "abc123", "lengthSeconds": 90},
            {"type": "channel", "title": "Some Channel", "videoId": "", "lengthSeconds": 0},
            {"type": "video", "title": "Show ED 1 Full", "videoId": "xyz789", "lengthSeconds": 271}
        ]"#;
        let videos = InvidiousClient::parse(body).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].link, "https://www.youtube.com/watch?v=abc123");
        assert!((videos[0].duration - 90.0).abs() < 1e-9);
        assert_eq!(videos[1].title, "Show ED 1 Full");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(InvidiousClient::parse("<html>rate limited</html>").is_err());
    }
}
