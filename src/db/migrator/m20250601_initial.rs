use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Anime)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(AodAnime)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(QItem)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(QItemSource)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(QItemSourceTiming)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Created by hand: sqlite CHECK constraints exist only at creation
        // time, so the [0, 100] range on `value` cannot come from the entity.
        manager
            .create_table(
                Table::create()
                    .table(QitemDifficulty::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(QitemDifficulty::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(QitemDifficulty::QitemId).integer().not_null())
                    .col(
                        ColumnDef::new(QitemDifficulty::Value)
                            .integer()
                            .not_null()
                            .check(
                                Expr::col(QitemDifficulty::Value)
                                    .gte(0)
                                    .and(Expr::col(QitemDifficulty::Value).lte(100)),
                            ),
                    )
                    .col(ColumnDef::new(QitemDifficulty::AddedBy).string().not_null())
                    .col(ColumnDef::new(QitemDifficulty::CreatedAt).string().not_null())
                    .col(ColumnDef::new(QitemDifficulty::UpdatedAt).string().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_qitem_difficulty_qitem")
                            .from(QitemDifficulty::Table, QitemDifficulty::QitemId)
                            .to(Qitem::Table, Qitem::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(QuizPart)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_anime_anidb_id")
                    .table(AnimeTable::Table)
                    .col(AnimeTable::AnidbId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_qitem_anime_category_number")
                    .table(Qitem::Table)
                    .col(Qitem::AnimeId)
                    .col(Qitem::Category)
                    .col(Qitem::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_quiz_part_timing_difficulty_style")
                    .table(QuizPartTable::Table)
                    .col(QuizPartTable::TimingId)
                    .col(QuizPartTable::DifficultyId)
                    .col(QuizPartTable::Style)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_qitem_source_qitem_id")
                    .table(QitemSource::Table)
                    .col(QitemSource::QitemId)
                    .to_owned(),
            )
            .await?;

        // Concurrent find workers targeting the same qitem with the same
        // strategy collide here; the loser swallows the violation.
        manager
            .create_index(
                Index::create()
                    .name("uq_qitem_source_qitem_added_by_path")
                    .table(QitemSource::Table)
                    .col(QitemSource::QitemId)
                    .col(QitemSource::AddedBy)
                    .col(QitemSource::Path)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(QuizPartTable::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(QitemDifficulty::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(QitemSourceTiming::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(QitemSource::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Qitem::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AodAnimeTable::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AnimeTable::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum AnimeTable {
    #[sea_orm(iden = "anime")]
    Table,
    AnidbId,
}

#[derive(DeriveIden)]
enum AodAnimeTable {
    #[sea_orm(iden = "aod_anime")]
    Table,
}

#[derive(DeriveIden)]
enum Qitem {
    Table,
    Id,
    AnimeId,
    Category,
    Number,
}

#[derive(DeriveIden)]
enum QitemSource {
    Table,
    QitemId,
    AddedBy,
    Path,
}

#[derive(DeriveIden)]
enum QitemSourceTiming {
    Table,
}

#[derive(DeriveIden)]
enum QitemDifficulty {
    Table,
    Id,
    QitemId,
    Value,
    AddedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum QuizPartTable {
    #[sea_orm(iden = "quiz_part")]
    Table,
    TimingId,
    DifficultyId,
    Style,
}
