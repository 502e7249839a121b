use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "anime")]
pub struct Model {
    /// MAL catalog id; at most one row per id.
    #[sea_orm(primary_key, auto_increment = false)]
    pub mal_id: i32,
    pub anidb_id: i32,
    pub title_ro: String,
    pub title_en: Option<String>,
    pub title_native: Option<String>,
    /// JSON array of alternative titles.
    pub synonyms: Option<String>,
    pub poster_url: Option<String>,
    pub anime_type: Option<String>,
    pub air_year: Option<i32>,
    pub air_season: Option<String>,
    /// JSON array of pre-fetched attachment records `{kind, title, url}`,
    /// consumed by the attachments find strategy.
    pub attachments: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::qitem::Entity")]
    QItem,
}

impl Related<super::qitem::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
