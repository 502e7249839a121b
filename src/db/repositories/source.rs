use crate::entities::{prelude::*, qitem_source, qitem_source_timing};
use crate::strategy;
use anyhow::Result;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::collections::HashSet;

/// One row of the download worker's job selection: the best not-yet-
/// downloaded source of its qitem, plus the priority rank it won with.
#[derive(Debug, Clone)]
pub struct PendingSource {
    pub source: qitem_source::Model,
    pub rank: usize,
}

pub struct SourceRepository {
    conn: DatabaseConnection,
}

impl SourceRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<qitem_source::Model>> {
        Ok(QItemSource::find_by_id(id).one(&self.conn).await?)
    }

    /// Insert a source discovered by a strategy (or the operator). Returns
    /// `None` when the same (qitem, added_by, path) already exists.
    pub async fn insert(
        &self,
        qitem_id: i32,
        platform: &str,
        path: &str,
        additional_path: Option<String>,
        added_by: &str,
    ) -> Result<Option<i32>> {
        let now = crate::db::now();
        let model = qitem_source::ActiveModel {
            qitem_id: Set(qitem_id),
            platform: Set(platform.to_string()),
            path: Set(path.to_string()),
            additional_path: Set(additional_path),
            added_by: Set(added_by.to_string()),
            local_fp: Set(None),
            invalid: Set(false),
            downloading: Set(false),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match QItemSource::insert(model).exec(&self.conn).await {
            Ok(res) => Ok(Some(res.last_insert_id)),
            Err(e) if crate::db::is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The download worker's selection: for each qitem, the single best
    /// (priority rank, then freshest) source on `platform` that is not
    /// invalid, not mid-download, and not yet downloaded.
    ///
    /// sqlite has no `DISTINCT ON`, so this is an ordered scan deduplicated
    /// per qitem in Rust; the ordering mirrors
    /// `ORDER BY qitem_id, rank(added_by), updated_at DESC`.
    pub async fn best_pending(
        &self,
        platform: &str,
        priorities: &[String],
    ) -> Result<Vec<PendingSource>> {
        let rows = QItemSource::find()
            .filter(qitem_source::Column::Platform.eq(platform))
            .filter(qitem_source::Column::Invalid.eq(false))
            .filter(qitem_source::Column::Downloading.eq(false))
            .filter(qitem_source::Column::LocalFp.is_null())
            .order_by_desc(qitem_source::Column::UpdatedAt)
            .all(&self.conn)
            .await?;

        let mut ranked: Vec<PendingSource> = rows
            .into_iter()
            .map(|source| {
                let rank = strategy::rank(priorities, &source.added_by);
                PendingSource { source, rank }
            })
            .collect();
        ranked.sort_by(|a, b| {
            (a.source.qitem_id, a.rank)
                .cmp(&(b.source.qitem_id, b.rank))
                .then(b.source.updated_at.cmp(&a.source.updated_at))
        });
        ranked.dedup_by_key(|p| p.source.qitem_id);
        Ok(ranked)
    }

    pub async fn set_downloading(&self, id: i32, downloading: bool) -> Result<()> {
        let Some(row) = QItemSource::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("source {id} not found");
        };
        let mut am: qitem_source::ActiveModel = row.into();
        am.downloading = Set(downloading);
        am.updated_at = Set(crate::db::now());
        am.update(&self.conn).await?;
        Ok(())
    }

    /// Permanent failure: `invalid = true` forces `local_fp` null and the
    /// row is never retried.
    pub async fn mark_invalid(&self, id: i32) -> Result<()> {
        let Some(row) = QItemSource::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("source {id} not found");
        };
        let mut am: qitem_source::ActiveModel = row.into();
        am.invalid = Set(true);
        am.local_fp = Set(None);
        am.downloading = Set(false);
        am.updated_at = Set(crate::db::now());
        am.update(&self.conn).await?;
        Ok(())
    }

    /// Successful download: record the local file and release the row.
    pub async fn set_local_fp(&self, id: i32, local_fp: &str) -> Result<()> {
        let Some(row) = QItemSource::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("source {id} not found");
        };
        let mut am: qitem_source::ActiveModel = row.into();
        am.local_fp = Set(Some(local_fp.to_string()));
        am.downloading = Set(false);
        am.updated_at = Set(crate::db::now());
        am.update(&self.conn).await?;
        Ok(())
    }

    /// Demotion (cleanup): a better-priority sibling got downloaded, free
    /// the disk this copy occupies.
    pub async fn clear_local_fp(&self, id: i32) -> Result<()> {
        let Some(row) = QItemSource::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("source {id} not found");
        };
        let mut am: qitem_source::ActiveModel = row.into();
        am.local_fp = Set(None);
        am.updated_at = Set(crate::db::now());
        am.update(&self.conn).await?;
        Ok(())
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        QItemSource::delete_by_id(id).exec(&self.conn).await?;
        Ok(())
    }

    pub async fn downloaded(&self) -> Result<Vec<qitem_source::Model>> {
        Ok(QItemSource::find()
            .filter(qitem_source::Column::LocalFp.is_not_null())
            .order_by_asc(qitem_source::Column::Id)
            .all(&self.conn)
            .await?)
    }

    pub async fn all_for_qitem(&self, qitem_id: i32) -> Result<Vec<qitem_source::Model>> {
        Ok(QItemSource::find()
            .filter(qitem_source::Column::QitemId.eq(qitem_id))
            .order_by_asc(qitem_source::Column::Id)
            .all(&self.conn)
            .await?)
    }

    pub async fn qitem_ids_with_downloads(&self) -> Result<Vec<i32>> {
        let ids: Vec<i32> = QItemSource::find()
            .select_only()
            .column(qitem_source::Column::QitemId)
            .filter(qitem_source::Column::LocalFp.is_not_null())
            .distinct()
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(ids)
    }

    /// Source ids with no timing stamped by `strategy_name` — the timing
    /// worker's job predicate.
    pub async fn ids_missing_timing_by(&self, strategy_name: &str) -> Result<Vec<i32>> {
        let all: Vec<i32> = QItemSource::find()
            .select_only()
            .column(qitem_source::Column::Id)
            .order_by_asc(qitem_source::Column::Id)
            .into_tuple()
            .all(&self.conn)
            .await?;

        let covered: HashSet<i32> = QItemSourceTiming::find()
            .select_only()
            .column(qitem_source_timing::Column::QitemSourceId)
            .filter(qitem_source_timing::Column::AddedBy.eq(strategy_name))
            .into_tuple::<i32>()
            .all(&self.conn)
            .await?
            .into_iter()
            .collect();

        Ok(all.into_iter().filter(|id| !covered.contains(id)).collect())
    }
}
