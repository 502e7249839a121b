use sea_orm::entity::prelude::*;

/// One opening or ending of an anime. `category` holds `"opening"` or
/// `"ending"` (see `models::Category`); (anime_id, category, number) is
/// unique.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "qitem")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub anime_id: i32,
    pub category: String,
    pub number: i32,
    pub song_name: Option<String>,
    pub song_artist: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::anime::Entity",
        from = "Column::AnimeId",
        to = "super::anime::Column::MalId",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Anime,
    #[sea_orm(has_many = "super::qitem_source::Entity")]
    QItemSource,
    #[sea_orm(has_many = "super::qitem_difficulty::Entity")]
    QItemDifficulty,
}

impl Related<super::anime::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Anime.def()
    }
}

impl Related<super::qitem_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItemSource.def()
    }
}

impl Related<super::qitem_difficulty::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItemDifficulty.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
