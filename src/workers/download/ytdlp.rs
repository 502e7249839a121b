//! The `yt-dlp` backend: subprocess invocation with a format expression that
//! prefers 720p, then anything up to 1080p, then best available.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{info, warn};

use super::{DownloadBackend, Outcome};
use crate::config::Config;
use crate::constants;
use crate::entities::qitem_source;
use crate::state::AppContext;
use crate::strategy::StrategyError;
use crate::workers::try_make_relative;

const FORMAT: &str = "bv*[height=720]+ba/b[height=720]/\
                      bv*[height>720][height<=1080]+ba/b[height>720][height<=1080]/bv*+ba/b";

/// stderr fragments that mean "the site is being difficult", not "the video
/// is gone".
const TEMPORARY_MARKERS: &[&str] = &[
    "Failed to extract any player response",
    "Sign in to confirm your age",
    "could not find", // cookies-from-browser profile hiccup
    "cookies",
];

pub struct YtdlpBackend {
    binary: PathBuf,
    attempts: u32,
    cookies_from_browser: Option<String>,
}

impl YtdlpBackend {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let binary =
            which::which("yt-dlp").map_err(|e| anyhow::anyhow!("yt-dlp not found on PATH: {e}"))?;
        Ok(Self {
            binary,
            attempts: config.downloads.ytdlp_attempts.max(1),
            cookies_from_browser: config.downloads.cookies_from_browser.clone(),
        })
    }

    async fn invoke(&self, url: &str, out_template: &str) -> Result<(), StrategyError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-f")
            .arg(FORMAT)
            .arg("-o")
            .arg(out_template)
            .arg("--no-playlist");
        if let Some(browser) = &self.cookies_from_browser {
            cmd.arg("--cookies-from-browser").arg(browser);
        }
        cmd.arg(url);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| {
            StrategyError::Other(anyhow::anyhow!("spawning yt-dlp: {e}"))
        })?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if TEMPORARY_MARKERS.iter().any(|m| stderr.contains(m)) {
            Err(StrategyError::TemporaryFailure(format!(
                "yt-dlp: {}",
                last_line(&stderr)
            )))
        } else {
            Err(StrategyError::InvalidSource(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                last_line(&stderr)
            )))
        }
    }
}

fn last_line(s: &str) -> &str {
    s.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("")
}

/// The output template names files `<source id>.<ext>` with the extension
/// chosen by yt-dlp; find whatever it produced.
fn find_output(dir: &Path, source_id: i32) -> Option<PathBuf> {
    let prefix = format!("{source_id}.");
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && !n.ends_with(".part"))
        })
}

#[async_trait]
impl DownloadBackend for YtdlpBackend {
    fn platform(&self) -> &str {
        constants::PLATFORM_YTDLP
    }

    async fn download(
        &self,
        ctx: &AppContext,
        source: &qitem_source::Model,
    ) -> Result<Outcome, StrategyError> {
        let download_dir = ctx.sources_dir(constants::PLATFORM_YTDLP);
        tokio::fs::create_dir_all(&download_dir)
            .await
            .map_err(|e| StrategyError::Other(e.into()))?;
        let out_template = format!("{}/{}.%(ext)s", download_dir.display(), source.id);

        let mut last_err = None;
        for attempt in 1..=self.attempts {
            info!(
                "Attempt #{attempt}: trying to download {} (source id={})",
                source.path, source.id
            );
            match self.invoke(&source.path, &out_template).await {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    warn!("Download error occurred: {e}");
                    last_err = Some(e);
                }
            }
        }
        if let Some(e) = last_err {
            return Err(e);
        }

        let Some(output) = find_output(&download_dir, source.id) else {
            return Err(StrategyError::InvalidSource(format!(
                "yt-dlp reported success but produced no file for source id={}",
                source.id
            )));
        };
        let local_fp = try_make_relative(&output);
        info!("Download succeeded, filepath = {}", local_fp.display());
        ctx.store
            .sources()
            .set_local_fp(source.id, &local_fp.display().to_string())
            .await
            .map_err(StrategyError::Other)?;
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_glob_ignores_partials_and_other_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7.mkv.part"), b"").unwrap();
        std::fs::write(dir.path().join("71.mkv"), b"").unwrap();
        assert!(find_output(dir.path(), 7).is_none());

        std::fs::write(dir.path().join("7.webm"), b"").unwrap();
        let found = find_output(dir.path(), 7).unwrap();
        assert!(found.ends_with("7.webm"));
    }

    #[test]
    fn last_line_skips_trailing_blanks() {
        assert_eq!(last_line("a\nb\n\n"), "b");
        assert_eq!(last_line(""), "");
    }
}
