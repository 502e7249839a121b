use sea_orm::entity::prelude::*;

/// A rendered artifact for a (timing, difficulty, style) triple.
///
/// References to the timing and difficulty rows are weak on purpose: deleting
/// either does not delete the part. The quiz-part worker notices that the
/// part's `updated_at` has fallen behind its inputs and re-renders instead.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "quiz_part")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub timing_id: i32,
    pub difficulty_id: i32,
    pub style: String,
    pub local_fp: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
