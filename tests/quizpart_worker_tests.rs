//! End-to-end tests of the quiz-part worker and the cleanup sweeps, with a
//! recording fake in place of ffmpeg.

use async_trait::async_trait;
use quizarr::config::Config;
use quizarr::db::PartFilters;
use quizarr::models::Category;
use quizarr::state::AppContext;
use quizarr::video::{RenderRequest, VideoMaker};
use quizarr::workers::cleanup;
use quizarr::workers::quizpart::{QuizPartWorker, cycle};
use sea_orm::Set;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

/// Stands in for ffmpeg: creates the output file and counts invocations.
struct FakeMaker {
    calls: AtomicU32,
    fail: bool,
}

impl FakeMaker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoMaker for FakeMaker {
    fn style(&self) -> &'static str {
        "classic"
    }

    async fn render(&self, request: &RenderRequest) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("simulated encoder failure");
        }
        if let Some(parent) = request.output_fp.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_fp, b"video").await?;
        Ok(())
    }
}

async fn context_in(dir: &TempDir) -> AppContext {
    let mut config = Config::default();
    config.general.database_url = format!("sqlite:{}/test.db", dir.path().display());
    config.directories.resources_dir = dir.path().join("resources").display().to_string();
    config.search.cache_enabled = false;
    AppContext::new(config).await.expect("context")
}

/// Anime + qitem + downloaded source + manual timing and difficulty; returns
/// (qitem_id, source_id, timing_id, difficulty_id).
async fn seed_pipeline(ctx: &AppContext, dir: &TempDir, mal_id: i32) -> (i32, i32, i32, i32) {
    let now = quizarr::db::now();
    ctx.store
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
        .unwrap();

    let qitem_id = ctx
        .store
        .qitems()
        .insert(mal_id, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();

    let media_fp = dir.path().join(format!("media_{mal_id}.mkv"));
    std::fs::write(&media_fp, b"media").unwrap();
    let source_id = ctx
        .store
        .sources()
        .insert(qitem_id, "local", &media_fp.display().to_string(), None, "manual")
        .await
        .unwrap()
        .unwrap();
    ctx.store
        .sources()
        .set_local_fp(source_id, &media_fp.display().to_string())
        .await
        .unwrap();

    let timing_id = ctx
        .store
        .timings()
        .insert(source_id, "00:00:00", "00:00:50", "manual")
        .await
        .unwrap();
    let difficulty_id = ctx
        .store
        .difficulties()
        .insert(qitem_id, 40, "manual")
        .await
        .unwrap();

    (qitem_id, source_id, timing_id, difficulty_id)
}

fn worker(maker: Arc<FakeMaker>) -> QuizPartWorker {
    QuizPartWorker {
        maker,
        filters: PartFilters::default(),
        keep_demoted: false,
    }
}

#[tokio::test]
async fn renders_once_then_settles() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    seed_pipeline(&ctx, &dir, 1).await;

    let maker = FakeMaker::new();
    let w = worker(Arc::clone(&maker));

    let rendered = cycle(&ctx, &w).await.unwrap();
    assert_eq!(rendered, 1);
    assert_eq!(maker.calls(), 1);

    let parts = ctx.store.quiz_parts().all().await.unwrap();
    assert_eq!(parts.len(), 1);
    assert!(std::path::Path::new(&parts[0].local_fp).exists());

    // Idempotence: a second pass finds nothing to do.
    let rendered = cycle(&ctx, &w).await.unwrap();
    assert_eq!(rendered, 0);
    assert_eq!(maker.calls(), 1);
}

#[tokio::test]
async fn upstream_edit_rebuilds_exactly_that_part() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    let (_, _, _, d1) = seed_pipeline(&ctx, &dir, 1).await;
    seed_pipeline(&ctx, &dir, 2).await;

    let maker = FakeMaker::new();
    let w = worker(Arc::clone(&maker));
    assert_eq!(cycle(&ctx, &w).await.unwrap(), 2);

    let before = ctx.store.quiz_parts().all().await.unwrap();
    assert_eq!(before.len(), 2);
    let stale_id = before
        .iter()
        .find(|p| p.difficulty_id == d1)
        .map(|p| p.id)
        .unwrap();
    let untouched_id = before.iter().find(|p| p.difficulty_id != d1).map(|p| p.id).unwrap();

    // Manual edit bumps the difficulty's updated_at past the render's.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    ctx.store.difficulties().touch(d1).await.unwrap();

    assert_eq!(cycle(&ctx, &w).await.unwrap(), 1);

    let after = ctx.store.quiz_parts().all().await.unwrap();
    assert_eq!(after.len(), 2);
    assert!(after.iter().all(|p| p.id != stale_id), "stale part replaced");
    assert!(
        after.iter().any(|p| p.id == untouched_id),
        "unrelated part untouched"
    );

    // The rebuilt render is no older than its inputs.
    let rebuilt = after.iter().find(|p| p.difficulty_id == d1).unwrap();
    let difficulty = ctx.store.difficulties().get(d1).await.unwrap().unwrap();
    assert!(rebuilt.updated_at >= difficulty.updated_at);
}

#[tokio::test]
async fn maker_failure_leaves_no_placeholder_behind() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    seed_pipeline(&ctx, &dir, 1).await;

    let maker = FakeMaker::failing();
    let w = worker(Arc::clone(&maker));

    let rendered = cycle(&ctx, &w).await.unwrap();
    assert_eq!(rendered, 0);
    assert_eq!(maker.calls(), 1);
    assert!(ctx.store.quiz_parts().all().await.unwrap().is_empty());
}

#[tokio::test]
async fn demotion_removes_inferior_renders_of_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    let (_, source_id, _, difficulty_id) = seed_pipeline(&ctx, &dir, 1).await;

    // An older render against a lower-priority timing of the same source.
    let default_timing = ctx
        .store
        .timings()
        .insert(source_id, "00:00:10", "00:00:10", "strategy_default")
        .await
        .unwrap();
    let inferior = ctx
        .store
        .quiz_parts()
        .insert_placeholder(default_timing, difficulty_id, "classic")
        .await
        .unwrap()
        .unwrap();
    let inferior_fp = dir.path().join("inferior.mkv");
    std::fs::write(&inferior_fp, b"old").unwrap();
    ctx.store
        .quiz_parts()
        .set_local_fp(inferior.id, &inferior_fp.display().to_string())
        .await
        .unwrap();

    let maker = FakeMaker::new();
    let w = worker(Arc::clone(&maker));
    assert_eq!(cycle(&ctx, &w).await.unwrap(), 1);

    let parts = ctx.store.quiz_parts().all().await.unwrap();
    assert_eq!(parts.len(), 1, "inferior render deleted");
    assert!(parts.iter().all(|p| p.id != inferior.id));
    assert!(!inferior_fp.exists(), "demoted file removed");
}

#[tokio::test]
async fn keep_demoted_flag_preserves_inferior_renders() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    let (_, source_id, _, difficulty_id) = seed_pipeline(&ctx, &dir, 1).await;

    let default_timing = ctx
        .store
        .timings()
        .insert(source_id, "00:00:10", "00:00:10", "strategy_default")
        .await
        .unwrap();
    let inferior = ctx
        .store
        .quiz_parts()
        .insert_placeholder(default_timing, difficulty_id, "classic")
        .await
        .unwrap()
        .unwrap();
    let inferior_fp = dir.path().join("inferior.mkv");
    std::fs::write(&inferior_fp, b"old").unwrap();
    ctx.store
        .quiz_parts()
        .set_local_fp(inferior.id, &inferior_fp.display().to_string())
        .await
        .unwrap();

    let maker = FakeMaker::new();
    let w = QuizPartWorker {
        maker: Arc::clone(&maker) as Arc<dyn VideoMaker>,
        filters: PartFilters::default(),
        keep_demoted: true,
    };
    assert_eq!(cycle(&ctx, &w).await.unwrap(), 1);
    assert_eq!(ctx.store.quiz_parts().all().await.unwrap().len(), 2);
    assert!(inferior_fp.exists());
}

#[tokio::test]
async fn cleanup_keeps_exactly_one_downloaded_source_per_qitem() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    let (qitem_id, manual_source, _, _) = seed_pipeline(&ctx, &dir, 1).await;

    // A second, automation-found source that also finished downloading.
    let auto_fp = dir.path().join("auto.mkv");
    std::fs::write(&auto_fp, b"media").unwrap();
    let auto_source = ctx
        .store
        .sources()
        .insert(
            qitem_id,
            "yt-dlp",
            "https://example.invalid/v",
            None,
            "strategy_video_search",
        )
        .await
        .unwrap()
        .unwrap();
    ctx.store
        .sources()
        .set_local_fp(auto_source, &auto_fp.display().to_string())
        .await
        .unwrap();

    cleanup::run(&ctx).await.unwrap();

    let manual = ctx.store.sources().get(manual_source).await.unwrap().unwrap();
    let auto = ctx.store.sources().get(auto_source).await.unwrap().unwrap();
    assert!(manual.local_fp.is_some(), "manual download retained");
    assert!(auto.local_fp.is_none(), "automation download demoted");

    // Idempotence: a second pass changes nothing further.
    cleanup::run(&ctx).await.unwrap();
    let manual2 = ctx.store.sources().get(manual_source).await.unwrap().unwrap();
    assert_eq!(manual2.local_fp, manual.local_fp);
}

#[tokio::test]
async fn cleanup_drops_rows_whose_files_vanished() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    let (_, source_id, _, _) = seed_pipeline(&ctx, &dir, 1).await;

    let maker = FakeMaker::new();
    let w = worker(Arc::clone(&maker));
    assert_eq!(cycle(&ctx, &w).await.unwrap(), 1);

    // Pull both files out from under the rows.
    let part = &ctx.store.quiz_parts().all().await.unwrap()[0];
    std::fs::remove_file(&part.local_fp).unwrap();
    let source = ctx.store.sources().get(source_id).await.unwrap().unwrap();
    std::fs::remove_file(source.local_fp.as_ref().unwrap()).unwrap();

    cleanup::run(&ctx).await.unwrap();

    assert!(ctx.store.quiz_parts().all().await.unwrap().is_empty());
    assert!(ctx.store.sources().get(source_id).await.unwrap().is_none());
}

#[tokio::test]
async fn invalid_local_source_is_marked_permanently() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;

    let now = quizarr::db::now();
    ctx.store
        .animes()
        .upsert(quizarr::entities::anime::ActiveModel {
            mal_id: Set(9),
            anidb_id: Set(1009),
            title_ro: Set("Anime 9".to_string()),
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
        .unwrap();
    let qitem_id = ctx
        .store
        .qitems()
        .insert(9, Category::Opening, 1, None, None)
        .await
        .unwrap()
        .unwrap();
    let source_id = ctx
        .store
        .sources()
        .insert(qitem_id, "local", "/nope", None, "manual")
        .await
        .unwrap()
        .unwrap();

    let source = ctx.store.sources().get(source_id).await.unwrap().unwrap();
    let mut bans = quizarr::workers::BanMap::new(std::time::Duration::from_secs(60));
    quizarr::workers::download::download_once(
        &ctx,
        &quizarr::workers::download::local::LocalBackend,
        &source,
        &mut bans,
    )
    .await
    .unwrap();

    let row = ctx.store.sources().get(source_id).await.unwrap().unwrap();
    assert!(row.invalid);
    assert_eq!(row.local_fp, None);
    assert!(!row.downloading);
    assert!(bans.is_empty(), "permanent failures are not banned");
}

#[tokio::test]
async fn placeholder_races_resolve_to_one_render() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_in(&dir).await;
    let (_, _, timing_id, difficulty_id) = seed_pipeline(&ctx, &dir, 1).await;

    let first = ctx
        .store
        .quiz_parts()
        .insert_placeholder(timing_id, difficulty_id, "classic")
        .await
        .unwrap();
    assert!(first.is_some());

    let second = ctx
        .store
        .quiz_parts()
        .insert_placeholder(timing_id, difficulty_id, "classic")
        .await
        .unwrap();
    assert!(second.is_none(), "loser of the race sees already-done");

    // A different style is a different artifact.
    let other_style = ctx
        .store
        .quiz_parts()
        .insert_placeholder(timing_id, difficulty_id, "onesec")
        .await
        .unwrap();
    assert!(other_style.is_some());
}
