//! Source-find workers: one loop per strategy, each filling in sources for
//! qitems that strategy has not covered yet.

pub mod attachments;
pub mod torrent_pack;
pub mod video_search;

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::LoopOptions;
use crate::state::AppContext;
use crate::strategy::StrategyError;
use crate::sync::ProcessedSet;

#[async_trait]
pub trait FindStrategy: Send + Sync {
    /// Stamped into `added_by` on every row this strategy creates.
    fn name(&self) -> &str;

    async fn run(&self, ctx: &AppContext, qitem_id: i32) -> Result<(), StrategyError>;
}

/// Strategies in configured priority order. Unknown names are a
/// configuration error.
pub fn registry(ctx: &AppContext) -> Result<Vec<Arc<dyn FindStrategy>>> {
    use crate::constants;

    let mut out: Vec<Arc<dyn FindStrategy>> = Vec::new();
    for name in &ctx.config.strategies.find {
        let strategy: Arc<dyn FindStrategy> = match name.as_str() {
            constants::STRATEGY_ATTACHMENTS => Arc::new(attachments::AttachmentsStrategy),
            constants::STRATEGY_VIDEO_SEARCH => {
                Arc::new(video_search::VideoSearchStrategy::from_config(&ctx.config))
            }
            constants::STRATEGY_TORRENT_PACK => {
                Arc::new(torrent_pack::TorrentPackStrategy::from_config(&ctx.config))
            }
            other => anyhow::bail!("unknown find strategy in config: {other}"),
        };
        out.push(strategy);
    }
    Ok(out)
}

/// Run every configured find strategy concurrently, starts staggered by the
/// configured delay to avoid a thundering herd against the database.
pub async fn run(ctx: Arc<AppContext>, opts: LoopOptions) -> Result<()> {
    let strategies = registry(&ctx)?;
    let max_no_fetch = std::time::Duration::from_secs(ctx.config.workers.max_no_fetch_seconds);

    let mut handles = Vec::new();
    for (i, strategy) in strategies.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        let delay = opts.startup_delay * u32::try_from(i).unwrap_or(u32::MAX);
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            strategy_loop(&ctx, strategy.as_ref(), opts, max_no_fetch).await
        }));
    }

    for handle in handles {
        handle.await??;
    }
    Ok(())
}

async fn strategy_loop(
    ctx: &AppContext,
    strategy: &dyn FindStrategy,
    opts: LoopOptions,
    max_no_fetch: std::time::Duration,
) -> Result<()> {
    let worker_dir = ctx.worker_dir("source/find")?;
    let processed_fp = worker_dir.join(format!("processed_{}.txt", strategy.name()));
    let gate = crate::sync::RateGate::new(opts.interval, false);

    info!("Find worker for \"{}\" started", strategy.name());
    loop {
        // Candidates: qitems this strategy has no source for, minus the ids
        // it already processed (it may legitimately have found nothing).
        let mut candidates = ctx
            .store
            .qitems()
            .ids_missing_source_by(strategy.name())
            .await?;
        {
            let processed = ProcessedSet::open(&processed_fp)?;
            candidates.retain(|id| !processed.contains(*id));
        }

        if candidates.is_empty() {
            debug!("\"{}\": no jobs were found", strategy.name());
            tokio::time::sleep(opts.wait).await;
            continue;
        }

        candidates.shuffle(&mut rand::rng());

        // Iterate until the batch is exhausted or the fetch amortization
        // window runs out, then re-query.
        let batch_started = Instant::now();
        for qitem_id in candidates {
            if batch_started.elapsed() > max_no_fetch {
                break;
            }

            info!(
                "Running strategy \"{}\" on qitem_id={}",
                strategy.name(),
                qitem_id
            );
            match gate.run(strategy.run(ctx, qitem_id)).await {
                Ok(()) => mark_processed(&processed_fp, qitem_id)?,
                Err(StrategyError::InvalidSource(reason)) => {
                    // Nothing usable for this qitem; don't revisit.
                    warn!(
                        "\"{}\" on qitem_id={}: {}",
                        strategy.name(),
                        qitem_id,
                        reason
                    );
                    mark_processed(&processed_fp, qitem_id)?;
                }
                Err(StrategyError::TemporaryFailure(reason)) => {
                    // Provider trouble; leave the id unprocessed and give
                    // the whole batch a rest.
                    warn!(
                        "\"{}\" on qitem_id={}: {} (will retry)",
                        strategy.name(),
                        qitem_id,
                        reason
                    );
                    tokio::time::sleep(opts.wait).await;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn mark_processed(processed_fp: &std::path::Path, qitem_id: i32) -> Result<()> {
    let mut processed = ProcessedSet::open(processed_fp)?;
    processed.insert(qitem_id);
    processed.commit()
}
