//! Rendering seam between the quiz-part worker and ffmpeg.
//!
//! The worker only knows the `VideoMaker` contract: feed it a fully resolved
//! render request, get an output file or an error. Styles are registered by
//! name; the ffmpeg invocations live behind the trait so tests can substitute
//! a recording fake.

pub mod classic;
pub mod concat;
pub mod onesec;
pub mod probe;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tracing::debug;

pub const STYLE_CLASSIC: &str = "classic";
pub const STYLE_ONESEC: &str = "onesec";

/// Everything a style needs to render one quiz part, resolved by the worker
/// beforehand so makers never touch the database.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Downloaded source media.
    pub source_fp: PathBuf,
    /// `HH:MM:SS(.ffffff)` timecodes into the source.
    pub guess_start: String,
    pub reveal_start: String,
    pub difficulty_value: i32,
    /// Reveal caption, e.g. `"Cowboy Bebop OP 1"`.
    pub title_text: String,
    /// QItem number, used by styles that render a bare numeral.
    pub number: i32,
    pub poster_url: Option<String>,
    pub output_fp: PathBuf,
}

#[async_trait]
pub trait VideoMaker: Send + Sync {
    fn style(&self) -> &'static str;

    async fn render(&self, request: &RenderRequest) -> Result<()>;
}

/// Resolve a style name to its maker. Unknown styles are a configuration
/// error at CLI parse time.
#[must_use]
pub fn maker_for(style: &str, static_dir: &Path) -> Option<Arc<dyn VideoMaker>> {
    match style {
        STYLE_CLASSIC => Some(Arc::new(classic::ClassicMaker::new(static_dir))),
        STYLE_ONESEC => Some(Arc::new(onesec::OneSecMaker::new(static_dir))),
        _ => None,
    }
}

#[must_use]
pub fn known_styles() -> &'static [&'static str] {
    &[STYLE_CLASSIC, STYLE_ONESEC]
}

/// Countdown clip for a difficulty value: five buckets of twenty.
#[must_use]
pub fn countdown_file(difficulty_value: i32) -> &'static str {
    const BUCKETS: [&str; 5] = [
        "very easy.mkv",
        "easy.mkv",
        "medium.mkv",
        "hard.mkv",
        "very hard.mkv",
    ];
    let idx = usize::try_from(difficulty_value / 20).unwrap_or(0).min(4);
    BUCKETS[idx]
}

/// Run an assembled ffmpeg command, surfacing stderr on failure.
pub(crate) async fn run_ffmpeg(args: &[String]) -> Result<()> {
    debug!("ffmpeg {}", args.join(" "));
    let output = tokio::process::Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr
            .lines()
            .rev()
            .take(20)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n");
        anyhow::bail!("ffmpeg exited with {}: {}", output.status, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn countdown_buckets() {
        assert_eq!(countdown_file(0), "very easy.mkv");
        assert_eq!(countdown_file(19), "very easy.mkv");
        assert_eq!(countdown_file(20), "easy.mkv");
        assert_eq!(countdown_file(59), "medium.mkv");
        assert_eq!(countdown_file(80), "very hard.mkv");
        assert_eq!(countdown_file(100), "very hard.mkv");
    }

    #[test]
    fn style_registry_knows_both_styles() {
        let dir = Path::new("/tmp");
        assert!(maker_for(STYLE_CLASSIC, dir).is_some());
        assert!(maker_for(STYLE_ONESEC, dir).is_some());
        assert!(maker_for("vaporwave", dir).is_none());
    }
}
