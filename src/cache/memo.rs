//! Key→bytes memo for outbound HTTP fetches: an embedded sqlite file, one
//! table, zstd-compressed values. A stored NULL means "the fetch returned
//! absent", which is as cacheable as a hit.
//!
//! Concurrency: callers racing on the same key each compute; the last writer
//! wins. Acceptable because the wrapped fetches are idempotent GETs.

use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

mod page {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "page")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub key: String,
        #[sea_orm(column_type = "Blob", nullable)]
        pub value: Option<Vec<u8>>,
        pub created_at: String,
        pub updated_at: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

const COMPRESSION_LEVEL: i32 = 3;

pub struct MemoCache {
    db_path: PathBuf,
    conn: OnceCell<DatabaseConnection>,
}

impl MemoCache {
    #[must_use]
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            conn: OnceCell::new(),
        }
    }

    /// Lazily connect and create the schema; every cache instance owns one
    /// sqlite file.
    async fn conn(&self) -> Result<&DatabaseConnection> {
        self.conn
            .get_or_try_init(|| async {
                if let Some(parent) = self.db_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let url = format!("sqlite:{}?mode=rwc", self.db_path.display());
                let mut opt = ConnectOptions::new(url);
                opt.max_connections(1).sqlx_logging(false);
                let conn = Database::connect(opt)
                    .await
                    .with_context(|| format!("opening memo cache {}", self.db_path.display()))?;

                let backend = conn.get_database_backend();
                let schema = sea_orm::Schema::new(backend);
                let mut stmt = schema.create_table_from_entity(page::Entity);
                conn.execute(backend.build(stmt.if_not_exists())).await?;
                Ok(conn)
            })
            .await
    }

    /// `Some(stored)` on a hit (where `stored` may itself be an absence),
    /// `None` on a miss.
    pub async fn get(&self, key: &str) -> Result<Option<Option<String>>> {
        let conn = self.conn().await?;
        // Racing writers may leave duplicate keys; the newest row wins.
        let row = page::Entity::find()
            .filter(page::Column::Key.eq(key))
            .order_by_desc(page::Column::Id)
            .one(conn)
            .await?;
        match row {
            None => Ok(None),
            Some(m) => match m.value {
                None => Ok(Some(None)),
                Some(bytes) => {
                    let raw = zstd::decode_all(bytes.as_slice())
                        .with_context(|| format!("decompressing memo entry {key:?}"))?;
                    Ok(Some(Some(String::from_utf8(raw)?)))
                }
            },
        }
    }

    pub async fn put(&self, key: &str, value: Option<&str>) -> Result<()> {
        let conn = self.conn().await?;
        let compressed = match value {
            Some(v) => Some(zstd::encode_all(v.as_bytes(), COMPRESSION_LEVEL)?),
            None => None,
        };
        let now = crate::db::now();
        page::ActiveModel {
            key: Set(key.to_string()),
            value: Set(compressed),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        Ok(())
    }

    /// Memoized fetch. Entries never expire; see DESIGN.md.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Option<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<String>>>,
    {
        if let Some(stored) = self.get(key).await? {
            return Ok(stored);
        }
        let value = fetch().await?;
        self.put(key, value.as_deref()).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cache_in(dir: &tempfile::TempDir) -> MemoCache {
        MemoCache::new(&dir.path().join("memo.sqlite3"))
    }

    #[tokio::test]
    async fn fetches_once_then_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let got = cache
                .get_or_fetch("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some("payload".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(got.as_deref(), Some("payload"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absence_is_cached_too() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let got = cache
                .get_or_fetch("missing", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert_eq!(got, None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = cache_in(&dir);
            cache.put("k", Some("v")).await.unwrap();
        }
        let cache = cache_in(&dir);
        assert_eq!(cache.get("k").await.unwrap(), Some(Some("v".to_string())));
    }
}
