use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct QBitConfig {
    pub base_url: String,

    pub username: String,

    pub password: String,
}

impl Default for QBitConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            username: "admin".to_string(),
            password: "adminadmin".to_string(),
        }
    }
}

/// WebUI API failures the download workers care to tell apart. `NotFound`
/// and `Conflict` map to temporary strategy failures; `UnsupportedMedia`
/// means the torrent itself is bad.
#[derive(Debug, Error)]
pub enum QbtError {
    #[error("qBittorrent authentication failed: {0}")]
    Auth(String),

    #[error("qBittorrent: not found (404)")]
    NotFound,

    #[error("qBittorrent: conflict (409)")]
    Conflict,

    #[error("qBittorrent: torrent file is not valid (415)")]
    UnsupportedMedia,

    #[error("qBittorrent: unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("qBittorrent: failed to parse response: {0}")]
    Parse(String),
}

fn status_error(status: StatusCode, body: String) -> QbtError {
    match status {
        StatusCode::NOT_FOUND => QbtError::NotFound,
        StatusCode::CONFLICT => QbtError::Conflict,
        StatusCode::UNSUPPORTED_MEDIA_TYPE => QbtError::UnsupportedMedia,
        _ => QbtError::Status { status, body },
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TorrentInfo {
    pub hash: String,

    pub name: String,

    pub state: String,

    pub progress: f64,

    pub save_path: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub tags: String,

    #[serde(default)]
    pub added_on: i64,
}

/// One entry of a torrent's contents. Recent qBittorrent versions call the
/// positional field `index`, older ones `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentFile {
    #[serde(alias = "id")]
    pub index: i64,

    pub name: String,

    pub progress: f64,

    pub priority: i32,
}

/// File priorities accepted by `torrents/filePrio`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePriority {
    Skip,
    Normal,
    High,
}

impl FilePriority {
    const fn as_api(self) -> i32 {
        match self {
            Self::Skip => 0,
            Self::Normal => 1,
            Self::High => 6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddTorrentOptions {
    pub save_path: Option<String>,

    pub category: Option<String>,

    pub tags: Option<String>,

    pub paused: bool,
}

#[derive(Debug, Clone)]
pub struct QBitClient {
    client: Client,
    config: QBitConfig,
}

impl QBitClient {
    pub fn new(config: QBitConfig) -> Result<Self, QbtError> {
        Ok(Self {
            client: Client::builder().cookie_store(true).build()?,
            config,
        })
    }

    pub async fn login(&self) -> Result<(), QbtError> {
        let url = format!("{}/api/v2/auth/login", self.config.base_url);

        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Referer", &self.config.base_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK && body.contains("Ok") {
            info!("Successfully authenticated with qBittorrent");
            Ok(())
        } else if body.contains("Fails") {
            Err(QbtError::Auth("invalid credentials".to_string()))
        } else {
            Err(QbtError::Auth(format!("status={status}, body={body}")))
        }
    }

    async fn ensure_auth(&self) -> Result<(), QbtError> {
        let url = format!("{}/api/v2/app/version", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .header("Referer", &self.config.base_url)
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            debug!("Session expired or not authenticated, logging in...");
            self.login().await?;
        }

        Ok(())
    }

    async fn post_form(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<(), QbtError> {
        self.ensure_auth().await?;

        let url = format!("{}/api/v2/{endpoint}", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .header("Referer", &self.config.base_url)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, body))
        }
    }

    /// Torrents known to the client, optionally narrowed to a hash set.
    pub async fn torrents_info(&self, hashes: &[String]) -> Result<Vec<TorrentInfo>, QbtError> {
        self.ensure_auth().await?;

        let mut url = format!("{}/api/v2/torrents/info", self.config.base_url);
        if !hashes.is_empty() {
            url = format!("{url}?hashes={}", urlencoding::encode(&hashes.join("|")));
        }

        let response = self
            .client
            .get(&url)
            .header("Referer", &self.config.base_url)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status != StatusCode::OK {
            return Err(status_error(status, text));
        }

        serde_json::from_str(&text).map_err(|e| {
            debug!("Failed to parse qBittorrent response: {}", text);
            QbtError::Parse(e.to_string())
        })
    }

    pub async fn torrent_by_hash(&self, hash: &str) -> Result<Option<TorrentInfo>, QbtError> {
        let torrents = self.torrents_info(&[hash.to_string()]).await?;
        Ok(torrents
            .into_iter()
            .find(|t| t.hash.eq_ignore_ascii_case(hash)))
    }

    /// Add a torrent by URL or local file path (qBittorrent fetches either).
    pub async fn torrents_add(
        &self,
        urls: &str,
        options: &AddTorrentOptions,
    ) -> Result<(), QbtError> {
        self.ensure_auth().await?;

        let api_url = format!("{}/api/v2/torrents/add", self.config.base_url);

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("urls", urls.to_string());
        if let Some(path) = &options.save_path {
            form.insert("savepath", path.clone());
        }
        if let Some(cat) = &options.category {
            form.insert("category", cat.clone());
        }
        if let Some(tags) = &options.tags {
            form.insert("tags", tags.clone());
        }
        if options.paused {
            form.insert("paused", "true".to_string());
            form.insert("stopped", "true".to_string());
        }

        let response = self
            .client
            .post(&api_url)
            .header("Referer", &self.config.base_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::OK {
            info!("Torrent added successfully");
            Ok(())
        } else {
            Err(status_error(status, body))
        }
    }

    pub async fn torrents_files(&self, hash: &str) -> Result<Vec<TorrentFile>, QbtError> {
        self.ensure_auth().await?;

        let url = format!(
            "{}/api/v2/torrents/files?hash={}",
            self.config.base_url,
            urlencoding::encode(hash)
        );
        let response = self
            .client
            .get(&url)
            .header("Referer", &self.config.base_url)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if status != StatusCode::OK {
            return Err(status_error(status, text));
        }

        serde_json::from_str(&text).map_err(|e| QbtError::Parse(e.to_string()))
    }

    /// Set the priority of one or more files (`indexes`) of a torrent.
    pub async fn torrents_file_priority(
        &self,
        hash: &str,
        indexes: &[i64],
        priority: FilePriority,
    ) -> Result<(), QbtError> {
        let ids = indexes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("|");
        let prio = priority.as_api().to_string();
        self.post_form(
            "torrents/filePrio",
            &[("hash", hash), ("id", &ids), ("priority", &prio)],
        )
        .await
    }

    pub async fn torrents_resume(&self, hash: &str) -> Result<(), QbtError> {
        // "start" on qBittorrent 5.x; "resume" kept working as an alias.
        match self.post_form("torrents/start", &[("hashes", hash)]).await {
            Err(QbtError::NotFound | QbtError::Status { .. }) => {
                self.post_form("torrents/resume", &[("hashes", hash)]).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_failure_kinds() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new()),
            QbtError::NotFound
        ));
        assert!(matches!(
            status_error(StatusCode::CONFLICT, String::new()),
            QbtError::Conflict
        ));
        assert!(matches!(
            status_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, String::new()),
            QbtError::UnsupportedMedia
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            QbtError::Status { .. }
        ));
    }

    #[test]
    fn file_priority_api_values() {
        assert_eq!(FilePriority::Skip.as_api(), 0);
        assert_eq!(FilePriority::Normal.as_api(), 1);
        assert_eq!(FilePriority::High.as_api(), 6);
    }

    #[test]
    fn torrent_file_accepts_both_index_and_id() {
        let new_style: TorrentFile =
            serde_json::from_str(r#"{"index": 3, "name": "a.mkv", "progress": 0.5, "priority": 1}"#)
                .unwrap();
        assert_eq!(new_style.index, 3);

        let old_style: TorrentFile =
            serde_json::from_str(r#"{"id": 4, "name": "b.mkv", "progress": 1.0, "priority": 6}"#)
                .unwrap();
        assert_eq!(old_style.index, 4);
    }

    #[test]
    fn default_config() {
        let config = QBitConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.username, "admin");
    }
}
