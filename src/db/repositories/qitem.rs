use crate::entities::{anime, prelude::*, qitem, qitem_difficulty, qitem_source};
use crate::models::Category;
use anyhow::Result;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::HashSet;

pub struct QItemRepository {
    conn: DatabaseConnection,
}

impl QItemRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_with_anime(&self, id: i32) -> Result<Option<(qitem::Model, anime::Model)>> {
        let row = QItem::find_by_id(id)
            .find_also_related(Anime)
            .one(&self.conn)
            .await?;
        match row {
            Some((q, Some(a))) => Ok(Some((q, a))),
            Some((q, None)) => anyhow::bail!("qitem {} has no anime row", q.id),
            None => Ok(None),
        }
    }

    /// Insert one qitem. Returns `None` when (anime_id, category, number)
    /// already exists — the caller lost a race and treats it as done.
    pub async fn insert(
        &self,
        anime_id: i32,
        category: Category,
        number: i32,
        song_name: Option<String>,
        song_artist: Option<String>,
    ) -> Result<Option<i32>> {
        let now = crate::db::now();
        let model = qitem::ActiveModel {
            anime_id: Set(anime_id),
            category: Set(category.as_db().to_string()),
            number: Set(number),
            song_name: Set(song_name),
            song_artist: Set(song_artist),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match QItem::insert(model).exec(&self.conn).await {
            Ok(res) => Ok(Some(res.last_insert_id)),
            Err(e) if crate::db::is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// QItem ids that have no source stamped by `strategy_name`. This is the
    /// find worker's "who has jobs left" predicate; the per-strategy
    /// processed set is subtracted by the caller.
    pub async fn ids_missing_source_by(&self, strategy_name: &str) -> Result<Vec<i32>> {
        let all: Vec<i32> = QItem::find()
            .select_only()
            .column(qitem::Column::Id)
            .order_by_asc(qitem::Column::Id)
            .into_tuple()
            .all(&self.conn)
            .await?;

        let covered: HashSet<i32> = QItemSource::find()
            .select_only()
            .column(qitem_source::Column::QitemId)
            .filter(qitem_source::Column::AddedBy.eq(strategy_name))
            .into_tuple::<i32>()
            .all(&self.conn)
            .await?
            .into_iter()
            .collect();

        Ok(all.into_iter().filter(|id| !covered.contains(id)).collect())
    }

    /// QItem ids that have no difficulty stamped by `strategy_name`.
    pub async fn ids_missing_difficulty_by(&self, strategy_name: &str) -> Result<Vec<i32>> {
        let all: Vec<i32> = QItem::find()
            .select_only()
            .column(qitem::Column::Id)
            .order_by_asc(qitem::Column::Id)
            .into_tuple()
            .all(&self.conn)
            .await?;

        let covered: HashSet<i32> = QItemDifficulty::find()
            .select_only()
            .column(qitem_difficulty::Column::QitemId)
            .filter(qitem_difficulty::Column::AddedBy.eq(strategy_name))
            .into_tuple::<i32>()
            .all(&self.conn)
            .await?
            .into_iter()
            .collect();

        Ok(all.into_iter().filter(|id| !covered.contains(id)).collect())
    }
}
