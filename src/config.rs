use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub directories: DirectoriesConfig,

    pub qbittorrent: QBittorrentConfig,

    pub search: SearchConfig,

    pub downloads: DownloadConfig,

    pub strategies: StrategiesConfig,

    pub workers: WorkersConfig,

    pub pack: PackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// 0 means "let tokio decide".
    pub worker_threads: usize,

    #[serde(default)]
    pub suppress_connection_errors: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/quizarr.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 0,
            suppress_connection_errors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoriesConfig {
    /// Mutable tree: downloaded sources, rendered parts, worker state files.
    pub resources_dir: String,

    /// Read-only assets: countdown clips, fonts, poster box, the pack
    /// torrent.
    pub static_dir: String,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            resources_dir: "resources".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QBittorrentConfig {
    pub url: String,

    pub username: String,

    pub password: String,
}

impl Default for QBittorrentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            username: "admin".to_string(),
            password: "adminadmin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Invidious-compatible search endpoint returning title/link/duration
    /// records.
    pub endpoint: String,

    pub request_timeout_seconds: u32,

    /// Memoize provider responses in a compressed sqlite cache.
    pub cache_enabled: bool,

    pub score_threshold: f64,

    /// Durations (seconds) a theme clip is expected to have; the duration
    /// kernel peaks at the closest one.
    pub expected_durations: Vec<f64>,

    pub helpers: Vec<String>,

    pub negative_helpers: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://inv.nadeko.net/api/v1/search".to_string(),
            request_timeout_seconds: 30,
            cache_enabled: true,
            score_threshold: 0.7,
            expected_durations: vec![90.0, 150.0],
            helpers: ["Creditless", "4K", "HD", "1080p"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            negative_helpers: ["Cover", "AMV", "Full", "Lyrics"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Seconds a source stays banned after a temporary failure.
    pub ban_duration_seconds: u64,

    pub ytdlp_attempts: u32,

    /// Browser profile yt-dlp should lift cookies from ("firefox",
    /// "chromium:Profile 1", …). Unset disables the flag.
    pub cookies_from_browser: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            ban_duration_seconds: 1800,
            ytdlp_attempts: 2,
            cookies_from_browser: None,
        }
    }
}

/// Priority-ordered strategy lists per stage. `"manual"` is implicitly
/// prepended everywhere and never needs listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub find: Vec<String>,

    pub timing: Vec<String>,

    pub difficulty: Vec<String>,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            find: vec![
                constants::STRATEGY_ATTACHMENTS.to_string(),
                constants::STRATEGY_TORRENT_PACK.to_string(),
                constants::STRATEGY_VIDEO_SEARCH.to_string(),
            ],
            timing: vec![constants::STRATEGY_DEFAULT_TIMING.to_string()],
            difficulty: vec![constants::STRATEGY_RANDOM_DIFFICULTY.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Seconds between job-selection cycles.
    pub interval_seconds: u64,

    /// Sleep when a cycle found nothing to do.
    pub wait_seconds: u64,

    /// Stagger between per-strategy loop starts.
    pub startup_delay_seconds: u64,

    /// A find loop re-queries the database after at most this many seconds
    /// of iterating cheap candidates.
    pub max_no_fetch_seconds: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10,
            wait_seconds: 60,
            startup_delay_seconds: 5,
            max_no_fetch_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Torrent metadata file; relative paths resolve under `static_dir`.
    pub torrent_file: String,

    pub folder_threshold: f64,

    pub file_threshold: f64,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            torrent_file: constants::PACK_TORRENT_FILE.to_string(),
            folder_threshold: 0.9,
            file_threshold: 0.8,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            directories: DirectoriesConfig::default(),
            qbittorrent: QBittorrentConfig::default(),
            search: SearchConfig::default(),
            downloads: DownloadConfig::default(),
            strategies: StrategiesConfig::default(),
            workers: WorkersConfig::default(),
            pack: PackConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = None;
        for path in Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(&path)?);
                break;
            }
        }
        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });

        config.apply_env();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Environment wins over the file for connection settings and the
    /// cookies hint, so deployments can keep credentials out of the file.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("QUIZARR_DATABASE_URL") {
            self.general.database_url = v;
        }
        if let Ok(v) = std::env::var("QUIZARR_QBT_URL") {
            self.qbittorrent.url = v;
        }
        if let Ok(v) = std::env::var("QUIZARR_QBT_USERNAME") {
            self.qbittorrent.username = v;
        }
        if let Ok(v) = std::env::var("QUIZARR_QBT_PASSWORD") {
            self.qbittorrent.password = v;
        }
        if let Ok(v) = std::env::var("QUIZARR_RESOURCES_DIR") {
            self.directories.resources_dir = v;
        }
        if let Ok(v) = std::env::var("QUIZARR_STATIC_DIR") {
            self.directories.static_dir = v;
        }
        if let Ok(v) = std::env::var("QUIZARR_COOKIES_FROM_BROWSER") {
            self.downloads.cookies_from_browser = Some(v);
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        if let Ok(p) = std::env::var("QUIZARR_CONFIG") {
            paths.push(PathBuf::from(p));
        }

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("quizarr").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".quizarr").join("config.toml"));
        }

        paths
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = PathBuf::from("config.toml");
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    /// Startup checks; a failure here is a configuration error and the
    /// process refuses to run.
    pub fn validate(&self) -> Result<()> {
        if self.general.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }
        if self.workers.interval_seconds == 0 {
            anyhow::bail!("workers.interval_seconds must be > 0");
        }
        if !(0.0..=1.0).contains(&self.search.score_threshold) {
            anyhow::bail!("search.score_threshold must be within [0, 1]");
        }
        if self.search.expected_durations.is_empty() {
            anyhow::bail!("search.expected_durations cannot be empty");
        }
        Ok(())
    }

    #[must_use]
    pub fn resources_dir(&self) -> PathBuf {
        PathBuf::from(&self.directories.resources_dir)
    }

    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        PathBuf::from(&self.directories.static_dir)
    }

    /// Resolved path of the pack torrent file.
    #[must_use]
    pub fn pack_torrent_path(&self) -> PathBuf {
        let p = PathBuf::from(&self.pack.torrent_file);
        if p.is_absolute() {
            p
        } else {
            self.static_dir().join(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.qbittorrent.url, "http://localhost:8080");
        assert_eq!(config.downloads.ban_duration_seconds, 1800);
    }

    #[test]
    fn config_serialization_round_trips() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[qbittorrent]"));
        assert!(toml_str.contains("[strategies]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.strategies.find, config.strategies.find);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [workers]
            interval_seconds = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.workers.interval_seconds, 3);
        assert_eq!(config.qbittorrent.url, "http://localhost:8080");
    }

    #[test]
    fn zero_interval_is_a_configuration_error() {
        let mut config = Config::default();
        config.workers.interval_seconds = 0;
        assert!(config.validate().is_err());
    }
}
