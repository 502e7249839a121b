use sea_orm::entity::prelude::*;

/// Read-mostly mirror of the anime-offline-database, refreshed by wholesale
/// replace (`clients::offline_db`).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "aod_anime")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub mal_id: i32,
    pub anidb_id: i32,
    pub title: String,
    pub poster_url: Option<String>,
    pub episodes: i32,
    /// Episode duration in seconds, when the dump provides one.
    pub duration: Option<i32>,
    pub release_year: Option<i32>,
    pub release_season: String,
    pub status: String,
    pub anime_type: String,
    /// JSON array of source catalog URLs.
    pub sources: String,
    /// JSON array of tags.
    pub tags: String,
    /// JSON array of synonym titles.
    pub synonyms: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
