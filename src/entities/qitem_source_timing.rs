use sea_orm::entity::prelude::*;

/// Guess/reveal start times within a source's playback, stored as
/// `HH:MM:SS(.ffffff)` timecodes (see `timecode`). One row per strategy.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "qitem_source_timing")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub qitem_source_id: i32,
    pub guess_start: String,
    pub reveal_start: String,
    pub added_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::qitem_source::Entity",
        from = "Column::QitemSourceId",
        to = "super::qitem_source::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    QItemSource,
}

impl Related<super::qitem_source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItemSource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
