use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, SqlErr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::quizpart::{BestTriple, PartFilters};
pub use repositories::source::PendingSource;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    #[must_use]
    pub fn animes(&self) -> repositories::anime::AnimeRepository {
        repositories::anime::AnimeRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn qitems(&self) -> repositories::qitem::QItemRepository {
        repositories::qitem::QItemRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn sources(&self) -> repositories::source::SourceRepository {
        repositories::source::SourceRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn timings(&self) -> repositories::timing::TimingRepository {
        repositories::timing::TimingRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn difficulties(&self) -> repositories::difficulty::DifficultyRepository {
        repositories::difficulty::DifficultyRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn quiz_parts(&self) -> repositories::quizpart::QuizPartRepository {
        repositories::quizpart::QuizPartRepository::new(self.conn.clone())
    }
}

/// RFC3339 timestamp written into `created_at`/`updated_at` columns.
/// Fixed microsecond precision and a `Z` suffix keep every value the same
/// width, so staleness checks are plain lexicographic compares, in SQL and
/// in Rust alike.
#[must_use]
pub fn now() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// True when `err` encodes a unique-constraint violation. Workers racing on
/// the same insert treat the loss as "another worker beat us to it".
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
