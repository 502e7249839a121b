use sea_orm::entity::prelude::*;

/// Integer difficulty in [0, 100] for a QItem, check-constrained in the
/// schema (the table is created manually in the initial migration). One row
/// per strategy.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "qitem_difficulty")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub qitem_id: i32,
    pub value: i32,
    pub added_by: String,
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
}

impl Related<super::qitem::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
