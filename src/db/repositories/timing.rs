use crate::entities::{prelude::*, qitem_source_timing};
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

pub struct TimingRepository {
    conn: DatabaseConnection,
}

impl TimingRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<qitem_source_timing::Model>> {
        Ok(QItemSourceTiming::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn insert(
        &self,
        qitem_source_id: i32,
        guess_start: &str,
        reveal_start: &str,
        added_by: &str,
    ) -> Result<i32> {
        let now = crate::db::now();
        let model = qitem_source_timing::ActiveModel {
            qitem_source_id: Set(qitem_source_id),
            guess_start: Set(guess_start.to_string()),
            reveal_start: Set(reveal_start.to_string()),
            added_by: Set(added_by.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        let res = QItemSourceTiming::insert(model).exec(&self.conn).await?;
        Ok(res.last_insert_id)
    }

}
