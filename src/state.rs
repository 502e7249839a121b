//! Process-wide context: configuration, database pool, external clients and
//! the filesystem layout. Built once at startup and passed by `Arc` into the
//! worker loops; no module-scope mutable state anywhere.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MemoCache;
use crate::clients::qbittorrent::{QBitClient, QBitConfig};
use crate::clients::video_search::{InvidiousClient, VideoSearch};
use crate::config::Config;
use crate::constants;
use crate::db::Store;

pub struct AppContext {
    pub config: Config,

    pub store: Store,

    /// One torrent-client session per process.
    pub qbit: Arc<QBitClient>,

    /// Video search provider, memoized when the config says so.
    pub search: Arc<dyn VideoSearch>,
}

impl AppContext {
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Store::new(&config.general.database_url).await?;

        let qbit = Arc::new(
            QBitClient::new(QBitConfig {
                base_url: config.qbittorrent.url.clone(),
                username: config.qbittorrent.username.clone(),
                password: config.qbittorrent.password.clone(),
            })
            .context("building qBittorrent client")?,
        );

        let cache = if config.search.cache_enabled {
            Some(Arc::new(MemoCache::new(
                &config.resources_dir().join("cache").join("search.sqlite3"),
            )))
        } else {
            None
        };
        let search: Arc<dyn VideoSearch> = Arc::new(InvidiousClient::new(
            &config.search.endpoint,
            Duration::from_secs(u64::from(config.search.request_timeout_seconds)),
            cache,
        )?);

        Ok(Self {
            config,
            store,
            qbit,
            search,
        })
    }

    /// Download target for one strategy's sources.
    #[must_use]
    pub fn sources_dir(&self, strategy_name: &str) -> PathBuf {
        self.config
            .resources_dir()
            .join(constants::SOURCES_DIR)
            .join(strategy_name)
    }

    #[must_use]
    pub fn quizparts_dir(&self) -> PathBuf {
        self.config.resources_dir().join(constants::QUIZPARTS_DIR)
    }

    #[must_use]
    pub fn quiz_dir(&self) -> PathBuf {
        self.config.resources_dir().join(constants::QUIZ_DIR)
    }

    /// Per-worker state directory (`workers/<stage>/…`), created on first
    /// use; holds processed sets, in-flight lists and the worker's log.
    pub fn worker_dir(&self, stage: &str) -> Result<PathBuf> {
        let dir = self
            .config
            .resources_dir()
            .join(constants::WORKERS_DIR)
            .join(stage);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating worker dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Priority lists with `"manual"` prepended, per stage.
    #[must_use]
    pub fn find_priorities(&self) -> Vec<String> {
        crate::strategy::with_manual(&self.config.strategies.find)
    }

    #[must_use]
    pub fn timing_priorities(&self) -> Vec<String> {
        crate::strategy::with_manual(&self.config.strategies.timing)
    }

    #[must_use]
    pub fn difficulty_priorities(&self) -> Vec<String> {
        crate::strategy::with_manual(&self.config.strategies.difficulty)
    }
}
