//! Torrent reconciler: polls the torrent client for the files the download
//! worker queued and finalizes source rows as they complete.

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::download::torrent::{IN_FLIGHT_FILE, InFlightTorrent, STAGE};
use super::try_make_relative;
use crate::clients::qbittorrent::TorrentInfo;
use crate::state::AppContext;
use crate::sync::FiledList;

pub async fn run(ctx: Arc<AppContext>, interval: std::time::Duration) -> Result<()> {
    info!("Torrent reconciler started");
    loop {
        if let Err(e) = check(&ctx).await {
            // Client hiccups are routine; the list is untouched and the next
            // cycle retries.
            warn!("Reconcile cycle failed: {e:#}");
        }
        tokio::time::sleep(interval).await;
    }
}

pub async fn check(ctx: &AppContext) -> Result<()> {
    let worker_dir = ctx.worker_dir(STAGE)?;
    let mut in_flight: FiledList<InFlightTorrent> =
        FiledList::open(&worker_dir.join(IN_FLIGHT_FILE))?;

    if in_flight.items.is_empty() {
        debug!("Nothing in flight");
        return in_flight.commit();
    }

    let hashes: Vec<String> = {
        let mut hs: Vec<String> = in_flight.items.iter().map(|t| t.infohash.clone()).collect();
        hs.sort();
        hs.dedup();
        hs
    };
    let torrents: HashMap<String, TorrentInfo> = ctx
        .qbit
        .torrents_info(&hashes)
        .await?
        .into_iter()
        .map(|t| (t.hash.to_lowercase(), t))
        .collect();

    let mut remaining = Vec::new();
    for entry in std::mem::take(&mut in_flight.items) {
        let Some(torrent) = torrents.get(&entry.infohash.to_lowercase()) else {
            warn!(
                "{} dropped: torrent is no longer in the client",
                entry.name
            );
            continue;
        };

        let files = ctx.qbit.torrents_files(&entry.infohash).await?;
        let Some(file) = files.iter().find(|f| f.name == entry.name) else {
            warn!("{} dropped: file name no longer present", entry.name);
            continue;
        };

        if (file.progress - 1.0).abs() < f64::EPSILON {
            let local_fp =
                try_make_relative(&Path::new(&torrent.save_path).join(&entry.name));
            ctx.store
                .sources()
                .set_local_fp(entry.source_id, &local_fp.display().to_string())
                .await?;
            info!(
                "{} finished downloading, local_fp={:?}",
                entry.name,
                local_fp.display().to_string()
            );
        } else {
            remaining.push(entry);
        }
    }

    in_flight.items = remaining;
    in_flight.commit()
}
