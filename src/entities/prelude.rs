pub use super::anime::Entity as Anime;
pub use super::aod_anime::Entity as AodAnime;
pub use super::qitem::Entity as QItem;
pub use super::qitem_difficulty::Entity as QItemDifficulty;
pub use super::qitem_source::Entity as QItemSource;
pub use super::qitem_source_timing::Entity as QItemSourceTiming;
pub use super::quiz_part::Entity as QuizPart;
