//! Source-download workers: one loop per platform, each claiming the best
//! not-yet-downloaded source per qitem and handing it to the platform
//! backend.

pub mod local;
pub mod torrent;
pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{BanMap, LoopOptions};
use crate::constants;
use crate::entities::qitem_source;
use crate::state::AppContext;
use crate::strategy::StrategyError;

/// What a successful backend call means for the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `local_fp` has been written; the row is done.
    Completed,

    /// The download continues out-of-process (torrent client); the row keeps
    /// `downloading = true` until the reconciler finalizes it.
    InFlight,
}

#[async_trait]
pub trait DownloadBackend: Send + Sync {
    fn platform(&self) -> &str;

    async fn download(
        &self,
        ctx: &AppContext,
        source: &qitem_source::Model,
    ) -> Result<Outcome, StrategyError>;
}

pub fn backend_for(ctx: &AppContext, platform: &str) -> Result<Arc<dyn DownloadBackend>> {
    match platform {
        constants::PLATFORM_LOCAL => Ok(Arc::new(local::LocalBackend)),
        constants::PLATFORM_YTDLP => Ok(Arc::new(ytdlp::YtdlpBackend::from_config(&ctx.config)?)),
        constants::PLATFORM_TORRENT => Ok(Arc::new(torrent::TorrentBackend)),
        other => anyhow::bail!("unknown download platform: {other}"),
    }
}

pub async fn run(ctx: Arc<AppContext>, platform: &str, opts: LoopOptions) -> Result<()> {
    let backend = backend_for(&ctx, platform)?;
    let priorities = ctx.find_priorities();
    let mut bans = BanMap::new(opts.ban_duration);
    let gate = crate::sync::RateGate::new(opts.interval, true);

    tokio::time::sleep(opts.startup_delay).await;
    info!("Download worker for platform \"{platform}\" started");

    loop {
        bans.expire();

        let pending = ctx.store.sources().best_pending(platform, &priorities).await?;
        let pending: Vec<_> = pending
            .into_iter()
            .filter(|p| !bans.is_banned(p.source.id))
            .collect();

        if pending.is_empty() {
            debug!("No jobs were found");
            tokio::time::sleep(opts.wait).await;
            continue;
        }

        for p in pending {
            let source = p.source;
            info!(
                "Downloading source id={} (qitem_id={}, added_by={}, rank={})",
                source.id, source.qitem_id, source.added_by, p.rank
            );

            gate.run(download_once(&ctx, backend.as_ref(), &source, &mut bans))
                .await?;
        }
    }
}

/// One claim/download/settle round for a single row. `downloading` is set
/// before the backend runs and released on every path except a torrent that
/// is genuinely still in flight.
pub async fn download_once(
    ctx: &AppContext,
    backend: &dyn DownloadBackend,
    source: &qitem_source::Model,
    bans: &mut BanMap,
) -> Result<()> {
    ctx.store.sources().set_downloading(source.id, true).await?;

    match backend.download(ctx, source).await {
        Ok(Outcome::Completed) => {
            info!("Source id={} downloaded", source.id);
            Ok(())
        }
        Ok(Outcome::InFlight) => {
            info!("Source id={} queued in the torrent client", source.id);
            Ok(())
        }
        Err(StrategyError::InvalidSource(reason)) => {
            warn!("Source id={} is invalid: {}", source.id, reason);
            ctx.store.sources().mark_invalid(source.id).await?;
            Ok(())
        }
        Err(StrategyError::TemporaryFailure(reason)) => {
            warn!("Source id={} failed temporarily: {}", source.id, reason);
            bans.ban(source.id);
            ctx.store.sources().set_downloading(source.id, false).await?;
            Ok(())
        }
        Err(e) => {
            // A bug, not a download problem: release the row and surface it.
            ctx.store.sources().set_downloading(source.id, false).await?;
            Err(e.into())
        }
    }
}
