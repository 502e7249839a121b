//! The `torrent` backend: hand the torrent to qBittorrent with only the
//! wanted file enabled, then let the reconciler finalize the row when the
//! client reports the file complete.

use async_trait::async_trait;
use lava_torrent::torrent::v1::Torrent;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use super::{DownloadBackend, Outcome};
use crate::clients::qbittorrent::{AddTorrentOptions, FilePriority, QbtError, TorrentFile};
use crate::constants;
use crate::entities::qitem_source;
use crate::state::AppContext;
use crate::strategy::StrategyError;
use crate::sync::FiledList;

/// One entry of the cross-process in-flight list shared with the torrent
/// reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InFlightTorrent {
    pub infohash: String,
    /// File name exactly as the client reports it (with the root folder).
    pub name: String,
    pub source_id: i32,
    pub added_on: String,
}

pub const IN_FLIGHT_FILE: &str = "downloading_torrents.json";

/// Worker-state directory stage for the torrent platform.
pub const STAGE: &str = "source/download/torrent";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Magnet,
    Url,
    Local,
}

fn forbidden_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>":|?*]"#).expect("Invalid Regex"))
}

fn windows_disk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]:").expect("Invalid Regex"))
}

fn classify(path: &str) -> Option<PathKind> {
    if path.starts_with("magnet:") {
        return Some(PathKind::Magnet);
    }
    if !path.ends_with(".torrent") {
        return None;
    }
    if let Ok(url) = url::Url::parse(path)
        && url.host_str().is_some_and(|h| h.len() >= 3)
    {
        return Some(PathKind::Url);
    }
    let stripped = windows_disk().replace(path, "");
    if !forbidden_chars().is_match(&stripped) {
        return Some(PathKind::Local);
    }
    None
}

fn qbt_failure(e: QbtError) -> StrategyError {
    match e {
        QbtError::UnsupportedMedia => {
            StrategyError::InvalidSource("torrent file is not valid".to_string())
        }
        QbtError::NotFound | QbtError::Conflict | QbtError::Auth(_) | QbtError::Http(_) => {
            StrategyError::TemporaryFailure(e.to_string())
        }
        other => StrategyError::Other(other.into()),
    }
}

/// Fetch the torrent metadata and compute the SHA-1 of its bencoded `info`
/// dict — the infohash qBittorrent keys everything on.
async fn resolve_infohash(path: &str, kind: PathKind) -> Result<String, StrategyError> {
    let bytes: Vec<u8> = match kind {
        PathKind::Url => {
            let client = reqwest::Client::builder()
                .user_agent(constants::USER_AGENT)
                .build()
                .map_err(|e| StrategyError::Other(e.into()))?;
            let response = client
                .get(path)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| {
                    StrategyError::TemporaryFailure(format!(
                        "failed to download torrent by url={path}: {e}"
                    ))
                })?;
            response
                .bytes()
                .await
                .map_err(|e| {
                    StrategyError::TemporaryFailure(format!("failed to read torrent body: {e}"))
                })?
                .to_vec()
        }
        PathKind::Local => tokio::fs::read(path).await.map_err(|e| {
            StrategyError::InvalidSource(format!("failed to read torrent file {path:?}: {e}"))
        })?,
        PathKind::Magnet => {
            return Err(StrategyError::InvalidSource(
                "magnet links are not supported (no info hash without metadata)".to_string(),
            ));
        }
    };

    let torrent = Torrent::read_from_bytes(&bytes).map_err(|e| {
        StrategyError::InvalidSource(format!("failed to bdecode torrent file contents: {e}"))
    })?;
    Ok(torrent.info_hash())
}

/// Match `additional_path` against the client's file list, with and without
/// the torrent's root folder, tolerating a leading slash on the target.
fn find_file<'a>(files: &'a [TorrentFile], additional_path: &str) -> Option<&'a TorrentFile> {
    let target = Path::new(additional_path.trim_start_matches('/'));
    files.iter().find(|f| {
        let with_root = Path::new(&f.name);
        let without_root: std::path::PathBuf = with_root.components().skip(1).collect();
        with_root == target || (!without_root.as_os_str().is_empty() && without_root == target)
    })
}

pub struct TorrentBackend;

#[async_trait]
impl DownloadBackend for TorrentBackend {
    fn platform(&self) -> &str {
        constants::PLATFORM_TORRENT
    }

    async fn download(
        &self,
        ctx: &AppContext,
        source: &qitem_source::Model,
    ) -> Result<Outcome, StrategyError> {
        let Some(additional_path) = source.additional_path.as_deref() else {
            return Err(StrategyError::InvalidSource(
                "torrent additional path is missing".to_string(),
            ));
        };
        let Some(kind) = classify(&source.path) else {
            return Err(StrategyError::InvalidSource(format!(
                "torrent path is invalid: {:?}",
                source.path
            )));
        };

        let infohash = resolve_infohash(&source.path, kind).await?;

        // Reuse a torrent someone (possibly a crashed run of this worker)
        // already added; otherwise add it paused with every file disabled.
        let existing = ctx
            .qbit
            .torrent_by_hash(&infohash)
            .await
            .map_err(qbt_failure)?;
        let files = if existing.is_some() {
            ctx.qbit.torrents_files(&infohash).await.map_err(qbt_failure)?
        } else {
            let save_path = ctx.sources_dir(constants::PLATFORM_TORRENT);
            tokio::fs::create_dir_all(&save_path)
                .await
                .map_err(|e| StrategyError::Other(e.into()))?;
            ctx.qbit
                .torrents_add(
                    &source.path,
                    &AddTorrentOptions {
                        save_path: Some(save_path.display().to_string()),
                        category: Some(constants::QBT_CATEGORY.to_string()),
                        tags: Some(format!("{}_{}", constants::QBT_CATEGORY, source.added_by)),
                        paused: true,
                    },
                )
                .await
                .map_err(qbt_failure)?;

            if ctx
                .qbit
                .torrent_by_hash(&infohash)
                .await
                .map_err(qbt_failure)?
                .is_none()
            {
                return Err(StrategyError::InvalidSource(format!(
                    "couldn't add new torrent with url={:?}",
                    source.path
                )));
            }

            let files = ctx.qbit.torrents_files(&infohash).await.map_err(qbt_failure)?;
            let all: Vec<i64> = files.iter().map(|f| f.index).collect();
            ctx.qbit
                .torrents_file_priority(&infohash, &all, FilePriority::Skip)
                .await
                .map_err(qbt_failure)?;
            files
        };

        let Some(file) = find_file(&files, additional_path) else {
            return Err(StrategyError::InvalidSource(format!(
                "{additional_path:?} was not found in torrent {:?}",
                source.path
            )));
        };

        ctx.qbit
            .torrents_file_priority(&infohash, &[file.index], FilePriority::High)
            .await
            .map_err(qbt_failure)?;
        ctx.qbit.torrents_resume(&infohash).await.map_err(qbt_failure)?;

        let worker_dir = ctx.worker_dir(STAGE).map_err(StrategyError::Other)?;
        let mut in_flight: FiledList<InFlightTorrent> =
            FiledList::open(&worker_dir.join(IN_FLIGHT_FILE)).map_err(StrategyError::Other)?;
        in_flight.items.push(InFlightTorrent {
            infohash: infohash.clone(),
            name: file.name.clone(),
            source_id: source.id,
            added_on: crate::db::now(),
        });
        in_flight.commit().map_err(StrategyError::Other)?;

        info!(
            "Torrent {} queued; waiting on file {:?}",
            infohash, file.name
        );
        Ok(Outcome::InFlight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(index: i64, name: &str) -> TorrentFile {
        TorrentFile {
            index,
            name: name.to_string(),
            progress: 0.0,
            priority: 0,
        }
    }

    #[test]
    fn classify_recognizes_the_three_kinds() {
        assert_eq!(classify("magnet:?xt=urn:btih:abc"), Some(PathKind::Magnet));
        assert_eq!(
            classify("https://example.com/pack.torrent"),
            Some(PathKind::Url)
        );
        assert_eq!(classify("static/anitousen.torrent"), Some(PathKind::Local));
        assert_eq!(classify("C:\\packs\\anitousen.torrent"), Some(PathKind::Local));
        assert_eq!(classify("not a torrent.mkv"), None);
        assert_eq!(classify("bad|chars.torrent"), None);
    }

    #[test]
    fn find_file_matches_with_and_without_root() {
        let files = vec![
            file(0, "Pack/Show A/op1.webm"),
            file(1, "Pack/Show B/ed2.webm"),
        ];
        assert_eq!(
            find_file(&files, "Pack/Show B/ed2.webm").map(|f| f.index),
            Some(1)
        );
        assert_eq!(
            find_file(&files, "Show A/op1.webm").map(|f| f.index),
            Some(0)
        );
        assert!(find_file(&files, "nope.webm").is_none());
    }

    #[test]
    fn leading_slash_on_the_full_path_matches() {
        let files = vec![file(0, "Pack/Show A/op1.webm")];
        assert_eq!(
            find_file(&files, "/Pack/Show A/op1.webm").map(|f| f.index),
            Some(0)
        );
    }
}
