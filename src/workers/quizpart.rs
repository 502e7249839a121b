//! Quiz-part worker: keeps the rendered artifacts in sync with the best
//! available (source, difficulty, timing) triples.
//!
//! Each cycle: delete renders invalidated by upstream edits (A), pick the
//! best-priority difficulty/timing per downloaded source (B), drop triples
//! already rendered (C), render the rest through the video maker (D), and
//! clean up renders demoted by the new winners (E).

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::LoopOptions;
use crate::db::{BestTriple, PartFilters};
use crate::models::Category;
use crate::state::AppContext;
use crate::video::{RenderRequest, VideoMaker};

pub struct QuizPartWorker {
    pub maker: Arc<dyn VideoMaker>,
    pub filters: PartFilters,
    /// `-k`: keep renders that a better triple just demoted.
    pub keep_demoted: bool,
}

pub async fn run(ctx: Arc<AppContext>, worker: QuizPartWorker, opts: LoopOptions) -> Result<()> {
    tokio::time::sleep(opts.startup_delay).await;
    info!("Quiz-part worker started (style={})", worker.maker.style());

    loop {
        let rendered = cycle(&ctx, &worker).await?;
        if rendered == 0 {
            debug!("No jobs were found");
            tokio::time::sleep(opts.wait).await;
        } else {
            tokio::time::sleep(opts.interval).await;
        }
    }
}

/// One full pass; returns how many parts were rendered.
pub async fn cycle(ctx: &AppContext, worker: &QuizPartWorker) -> Result<usize> {
    // Step A: any upstream edit invalidates its dependent renders.
    let stale = ctx.store.quiz_parts().stale(&worker.filters).await?;
    for part in stale {
        info!(
            "Deleting stale quiz part id={} (style={})",
            part.id, part.style
        );
        remove_file_if_any(&part.local_fp).await;
        ctx.store.quiz_parts().delete(part.id).await?;
    }

    // Step B: best (difficulty, timing) per downloaded source.
    let triples = ctx
        .store
        .quiz_parts()
        .best_triples(
            &ctx.difficulty_priorities(),
            &ctx.timing_priorities(),
            &worker.filters,
        )
        .await?;

    // Step C: keep only triples with no render for this style yet.
    let existing = ctx.store.quiz_parts().existing_keys().await?;
    let style = worker.maker.style().to_string();
    let todo: Vec<&BestTriple> = triples
        .iter()
        .filter(|t| !existing.contains(&(t.timing_id, t.difficulty_id, style.clone())))
        .collect();

    let mut rendered = 0;
    for triple in todo {
        match render_one(ctx, worker, triple).await {
            Ok(true) => {
                rendered += 1;
                if !worker.keep_demoted {
                    demote_siblings(ctx, worker, triple).await?;
                }
            }
            Ok(false) => {}
            // Maker failures are logged and the loop moves on; the
            // placeholder row is already gone.
            Err(e) => warn!(
                "Rendering (timing={}, difficulty={}) failed: {e:#}",
                triple.timing_id, triple.difficulty_id
            ),
        }
    }
    Ok(rendered)
}

/// Steps D.1–D.5 for one triple. `Ok(false)` means another worker rendered
/// this triple first.
async fn render_one(
    ctx: &AppContext,
    worker: &QuizPartWorker,
    triple: &BestTriple,
) -> Result<bool> {
    let style = worker.maker.style();
    let Some(part) = ctx
        .store
        .quiz_parts()
        .insert_placeholder(triple.timing_id, triple.difficulty_id, style)
        .await?
    else {
        debug!(
            "(timing={}, difficulty={}, style={}) already rendered elsewhere",
            triple.timing_id, triple.difficulty_id, style
        );
        return Ok(false);
    };

    let output_fp = super::try_make_relative(&ctx.quizparts_dir().join(format!("{}.mkv", part.id)));
    ctx.store
        .quiz_parts()
        .set_local_fp(part.id, &output_fp.display().to_string())
        .await?;

    let request = match build_request(ctx, triple, &output_fp).await {
        Ok(r) => r,
        Err(e) => {
            ctx.store.quiz_parts().delete(part.id).await?;
            return Err(e);
        }
    };

    info!(
        "Rendering quiz part id={} on qitem_id={} (timing={}, difficulty={})",
        part.id, triple.qitem_id, triple.timing_id, triple.difficulty_id
    );
    if let Err(e) = worker.maker.render(&request).await {
        warn!("Video making failed!");
        ctx.store.quiz_parts().delete(part.id).await?;
        return Err(e);
    }
    info!("Created quiz part at {}", output_fp.display());
    Ok(true)
}

async fn build_request(
    ctx: &AppContext,
    triple: &BestTriple,
    output_fp: &Path,
) -> Result<RenderRequest> {
    let timing = ctx
        .store
        .timings()
        .get(triple.timing_id)
        .await?
        .context("timing row vanished mid-render")?;
    let difficulty = ctx
        .store
        .difficulties()
        .get(triple.difficulty_id)
        .await?
        .context("difficulty row vanished mid-render")?;
    let source = ctx
        .store
        .sources()
        .get(timing.qitem_source_id)
        .await?
        .context("source row vanished mid-render")?;
    let local_fp = source
        .local_fp
        .as_ref()
        .context("source lost its local file mid-render")?;
    let (item, anime) = ctx
        .store
        .qitems()
        .get_with_anime(source.qitem_id)
        .await?
        .context("qitem row vanished mid-render")?;

    let category_short = Category::from_db(&item.category)
        .map_or("??", |c| match c {
            Category::Opening => "OP",
            Category::Ending => "ED",
        });

    Ok(RenderRequest {
        source_fp: local_fp.into(),
        guess_start: timing.guess_start,
        reveal_start: timing.reveal_start,
        difficulty_value: difficulty.value,
        title_text: format!("{} {} {}", anime.title_ro, category_short, item.number),
        number: item.number,
        poster_url: anime.poster_url,
        output_fp: output_fp.to_path_buf(),
    })
}

/// Step E: with a fresh render for the best triple in place, other renders
/// of the same source and style are now inferior combinations; delete them
/// (rows and files) so exactly one canonical render per source survives.
async fn demote_siblings(
    ctx: &AppContext,
    worker: &QuizPartWorker,
    triple: &BestTriple,
) -> Result<()> {
    let style = worker.maker.style();
    let siblings = ctx.store.quiz_parts().parts_for_source(triple.source_id).await?;
    for part in siblings {
        if part.style != style {
            continue;
        }
        if part.timing_id == triple.timing_id && part.difficulty_id == triple.difficulty_id {
            continue;
        }
        info!(
            "Deleting demoted quiz part id={} (timing={}, difficulty={})",
            part.id, part.timing_id, part.difficulty_id
        );
        remove_file_if_any(&part.local_fp).await;
        ctx.store.quiz_parts().delete(part.id).await?;
    }
    Ok(())
}

async fn remove_file_if_any(local_fp: &str) {
    if local_fp.is_empty() {
        return;
    }
    match tokio::fs::remove_file(local_fp).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {local_fp:?}: {e}"),
    }
}
