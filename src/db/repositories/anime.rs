use crate::entities::{anime, aod_anime, prelude::*};
use anyhow::Result;
use sea_orm::{DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::info;

pub struct AnimeRepository {
    conn: DatabaseConnection,
}

impl AnimeRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// The anime together with its offline-database mirror row, when one
    /// exists. Strategies use the mirror for type/season inference.
    pub async fn get_with_aod(
        &self,
        mal_id: i32,
    ) -> Result<Option<(anime::Model, Option<aod_anime::Model>)>> {
        let Some(a) = Anime::find_by_id(mal_id).one(&self.conn).await? else {
            return Ok(None);
        };
        let aod = AodAnime::find_by_id(mal_id).one(&self.conn).await?;
        Ok(Some((a, aod)))
    }

    pub async fn upsert(&self, model: anime::ActiveModel) -> Result<()> {
        let mut model = model;
        let now = crate::db::now();
        if let sea_orm::ActiveValue::NotSet = model.created_at {
            model.created_at = Set(now.clone());
        }
        model.updated_at = Set(now);

        Anime::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(anime::Column::MalId)
                    .update_columns([
                        anime::Column::AnidbId,
                        anime::Column::TitleRo,
                        anime::Column::TitleEn,
                        anime::Column::TitleNative,
                        anime::Column::Synonyms,
                        anime::Column::PosterUrl,
                        anime::Column::AnimeType,
                        anime::Column::AirYear,
                        anime::Column::AirSeason,
                        anime::Column::Attachments,
                        anime::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    /// Wholesale replace of the offline-database mirror. The table only ever
    /// changes through this path, so a delete-all + bulk insert inside one
    /// transaction is enough.
    pub async fn replace_aod(&self, rows: Vec<aod_anime::ActiveModel>) -> Result<usize> {
        let count = rows.len();
        let txn = self.conn.begin().await?;

        AodAnime::delete_many().exec(&txn).await?;

        for chunk in rows.chunks(500) {
            AodAnime::insert_many(chunk.to_vec()).exec(&txn).await?;
        }

        txn.commit().await?;
        info!("Replaced offline-database mirror with {} rows", count);
        Ok(count)
    }

}
