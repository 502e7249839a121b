use sea_orm::entity::prelude::*;

/// A candidate video for a QItem.
///
/// `local_fp` is non-null exactly when the source has been downloaded.
/// `invalid` marks a permanent failure and implies `local_fp IS NULL`.
/// `downloading` is transient: a live download backend owns the row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "qitem_source")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub qitem_id: i32,
    pub platform: String,
    pub path: String,
    /// A file within the primary path, e.g. a file inside a torrent.
    pub additional_path: Option<String>,
    pub added_by: String,
    pub local_fp: Option<String>,
    pub invalid: bool,
    pub downloading: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::qitem::Entity",
        from = "Column::QitemId",
        to = "super::qitem::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    QItem,
    #[sea_orm(has_many = "super::qitem_source_timing::Entity")]
    QItemSourceTiming,
}

impl Related<super::qitem::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItem.def()
    }
}

impl Related<super::qitem_source_timing::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItemSourceTiming.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
