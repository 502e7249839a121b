use crate::entities::{prelude::*, qitem_difficulty};
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

pub struct DifficultyRepository {
    conn: DatabaseConnection,
}

impl DifficultyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, id: i32) -> Result<Option<qitem_difficulty::Model>> {
        Ok(QItemDifficulty::find_by_id(id).one(&self.conn).await?)
    }

    /// Value range is double-checked here; the schema CHECK is the backstop.
    pub async fn insert(&self, qitem_id: i32, value: i32, added_by: &str) -> Result<i32> {
        anyhow::ensure!(
            (0..=100).contains(&value),
            "difficulty {value} outside [0, 100]"
        );
        let now = crate::db::now();
        let model = qitem_difficulty::ActiveModel {
            qitem_id: Set(qitem_id),
            value: Set(value),
            added_by: Set(added_by.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };
        let res = QItemDifficulty::insert(model).exec(&self.conn).await?;
        Ok(res.last_insert_id)
    }

    /// Bump `updated_at`, the way the admin surface does after a manual
    /// edit; the quiz-part worker picks the change up as staleness.
    pub async fn touch(&self, id: i32) -> Result<()> {
        use sea_orm::ActiveModelTrait;
        let Some(row) = QItemDifficulty::find_by_id(id).one(&self.conn).await? else {
            anyhow::bail!("difficulty {id} not found");
        };
        let mut am: qitem_difficulty::ActiveModel = row.into();
        am.updated_at = Set(crate::db::now());
        am.update(&self.conn).await?;
        Ok(())
    }
}
