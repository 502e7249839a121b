//! Integration tests over a real (tempdir-backed) sqlite store: schema
//! constraints, job-selection predicates and the cleanup sweeps.

use quizarr::db::Store;
use quizarr::entities::{prelude::*, qitem_difficulty};
use quizarr::models::Category;
use sea_orm::{EntityTrait, Set};
use tempfile::TempDir;

async fn store_in(dir: &TempDir) -> Store {
    let db_path = dir.path().join("test.db");
    Store::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("store")
}

async fn seed_anime(store: &Store, mal_id: i32) {
    let now = quizarr::db::now();
    store
        .animes()
        .upsert(quizarr::entities::anime::ActiveModel {
            mal_id: Set(mal_id),
            anidb_id: Set(mal_id + 1000),
            title_ro: Set(format!("Anime {mal_id}")),
            title_en: Set(None),
            title_native: Set(None),
            synonyms: Set(None),
            poster_url: Set(None),
            anime_type: Set(Some("tv".to_string())),
            air_year: Set(None),
            air_season: Set(None),
            attachments: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        })
        .await
        .expect("anime upsert");
}

#[tokio::test]
async fn qitem_uniqueness_resolves_races() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir).await;
    seed_anime(&store, 1).await;

    let first = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap();
    assert!(first.is_some());

    // Same (anime, category, number): the loser sees "already done".
    let second = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap();
    assert!(second.is_none());

    // A different number is a different qitem.
    let third = store
        .qitems()
        .insert(1, Category::Opening, 2, None, None)
        .await
        .unwrap();
    assert!(third.is_some());
}

#[tokio::test]
async fn difficulty_check_constraint_bounds_the_range() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir).await;
    seed_anime(&store, 1).await;
    let qitem_id = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();

    // Boundary values pass.
    store.difficulties().insert(qitem_id, 0, "manual").await.unwrap();
    store
        .difficulties()
        .insert(qitem_id, 100, "manual")
        .await
        .unwrap();

    // Repository validation rejects out-of-range before the DB does.
    assert!(store.difficulties().insert(qitem_id, -1, "manual").await.is_err());
    assert!(store.difficulties().insert(qitem_id, 101, "manual").await.is_err());

    // And the schema CHECK is the backstop for writers bypassing the
    // repository.
    let now = quizarr::db::now();
    let raw = QItemDifficulty::insert(qitem_difficulty::ActiveModel {
        qitem_id: Set(qitem_id),
        value: Set(101),
        added_by: Set("rogue".to_string()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    })
    .exec(&store.conn)
    .await;
    assert!(raw.is_err());
}

#[tokio::test]
async fn source_insert_is_idempotent_per_strategy_and_path() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir).await;
    seed_anime(&store, 1).await;
    let qitem_id = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();

    let first = store
        .sources()
        .insert(qitem_id, "yt-dlp", "https://example.invalid/v", None, "strategy_video_search")
        .await
        .unwrap();
    assert!(first.is_some());

    let second = store
        .sources()
        .insert(qitem_id, "yt-dlp", "https://example.invalid/v", None, "strategy_video_search")
        .await
        .unwrap();
    assert!(second.is_none(), "concurrent duplicate resolves to a no-op");
}

#[tokio::test]
async fn invalid_sources_never_carry_a_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir).await;
    seed_anime(&store, 1).await;
    let qitem_id = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();
    let source_id = store
        .sources()
        .insert(qitem_id, "local", "/tmp/v.mkv", None, "manual")
        .await
        .unwrap()
        .unwrap();

    store.sources().set_local_fp(source_id, "/tmp/v.mkv").await.unwrap();
    store.sources().mark_invalid(source_id).await.unwrap();

    let row = store.sources().get(source_id).await.unwrap().unwrap();
    assert!(row.invalid);
    assert_eq!(row.local_fp, None);
    assert!(!row.downloading);
}

#[tokio::test]
async fn best_pending_prefers_manual_and_skips_claimed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir).await;
    seed_anime(&store, 1).await;
    let qitem_id = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();

    let auto_id = store
        .sources()
        .insert(qitem_id, "yt-dlp", "https://a", None, "strategy_video_search")
        .await
        .unwrap()
        .unwrap();
    let manual_id = store
        .sources()
        .insert(qitem_id, "yt-dlp", "https://b", None, "manual")
        .await
        .unwrap()
        .unwrap();

    let priorities = vec!["manual".to_string(), "strategy_video_search".to_string()];
    let pending = store.sources().best_pending("yt-dlp", &priorities).await.unwrap();
    assert_eq!(pending.len(), 1, "one best row per qitem");
    assert_eq!(pending[0].source.id, manual_id);
    assert_eq!(pending[0].rank, 0);

    // A row mid-download is invisible to the selection.
    store.sources().set_downloading(manual_id, true).await.unwrap();
    let pending = store.sources().best_pending("yt-dlp", &priorities).await.unwrap();
    assert_eq!(pending[0].source.id, auto_id);

    // And an invalid row never comes back.
    store.sources().mark_invalid(auto_id).await.unwrap();
    store.sources().set_downloading(manual_id, false).await.unwrap();
    let pending = store.sources().best_pending("yt-dlp", &priorities).await.unwrap();
    assert_eq!(pending[0].source.id, manual_id);
}

#[tokio::test]
async fn job_predicates_shrink_as_records_appear() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir).await;
    seed_anime(&store, 1).await;
    let q1 = store
        .qitems()
        .insert(1, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();
    let q2 = store
        .qitems()
        .insert(1, Category::Ending, 1, None, None)
        .await
        .unwrap()
        .unwrap();

    let missing = store
        .qitems()
        .ids_missing_source_by("strategy_video_search")
        .await
        .unwrap();
    assert_eq!(missing, vec![q1, q2]);

    store
        .sources()
        .insert(q1, "yt-dlp", "https://a", None, "strategy_video_search")
        .await
        .unwrap();

    let missing = store
        .qitems()
        .ids_missing_source_by("strategy_video_search")
        .await
        .unwrap();
    assert_eq!(missing, vec![q2]);

    // Another strategy's coverage does not count.
    let missing_other = store
        .qitems()
        .ids_missing_source_by("strategy_attachments")
        .await
        .unwrap();
    assert_eq!(missing_other, vec![q1, q2]);

    // Same shape for timings.
    let s1 = store
        .sources()
        .insert(q2, "local", "/tmp/x.mkv", None, "manual")
        .await
        .unwrap()
        .unwrap();
    let missing_t = store
        .sources()
        .ids_missing_timing_by("strategy_default")
        .await
        .unwrap();
    assert!(missing_t.contains(&s1));

    store
        .timings()
        .insert(s1, "00:00:00", "00:00:50", "strategy_default")
        .await
        .unwrap();
    let missing_t = store
        .sources()
        .ids_missing_timing_by("strategy_default")
        .await
        .unwrap();
    assert!(!missing_t.contains(&s1));
}
