//! The `classic` style: countdown clip with the guess audio underneath,
//! then the reveal clip with a poster box and title caption.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{RenderRequest, VideoMaker, countdown_file, run_ffmpeg};
use crate::constants;

/// Segment timing of the classic layout, all in seconds.
#[derive(Debug, Clone, Copy)]
struct Timings {
    guess_dur: f64,
    reveal_dur: f64,
    audio_delay: f64,
    count_in_delay: f64,
    count_out_delay: f64,
    countdown_fade_out: f64,
    guess_fade_out: f64,
    guess_fade_in: f64,
    reveal_fade_out: f64,
    reveal_fade_in: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            guess_dur: 10.0,
            reveal_dur: 8.0,
            audio_delay: 1.0,
            count_in_delay: 0.5,
            count_out_delay: 0.3,
            countdown_fade_out: 1.0,
            guess_fade_out: 1.5,
            guess_fade_in: 0.0,
            reveal_fade_out: 2.0,
            reveal_fade_in: 0.5,
        }
    }
}

impl Timings {
    /// Total countdown-segment duration: guess plus the lead-in and tail
    /// pauses around the counting.
    fn countdown_dur(&self) -> f64 {
        self.guess_dur + self.audio_delay + self.count_in_delay + self.count_out_delay
    }
}

const POSTER_W: u32 = 252;
const POSTER_H: u32 = 336;
const POSTER_X: u32 = 70;
const POSTER_Y: u32 = 360;
const TEXT_X: u32 = 115;
const TEXT_Y: u32 = 620;
const LOUDNORM_I: f64 = -18.0;
const FPS: u32 = 24;

/// Escape a value for use inside an ffmpeg filter argument.
pub(crate) fn filter_escape(s: &str) -> String {
    s.replace('\\', r"\\")
        .replace(':', r"\:")
        .replace('\'', r"\'")
}

pub struct ClassicMaker {
    static_dir: PathBuf,
    timings: Timings,
}

impl ClassicMaker {
    #[must_use]
    pub fn new(static_dir: &Path) -> Self {
        Self {
            static_dir: static_dir.to_path_buf(),
            timings: Timings::default(),
        }
    }

    async fn fetch_poster(&self, url: &str, dest: &Path) -> Result<()> {
        let client = reqwest::Client::builder()
            .user_agent(constants::USER_AGENT)
            .build()?;
        let bytes = client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await
            .with_context(|| format!("downloading poster {url}"))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }

    fn build_args(&self, request: &RenderRequest, poster_fp: Option<&Path>) -> Vec<String> {
        let t = &self.timings;
        let countdown_fp = self
            .static_dir
            .join(constants::COUNTDOWNS_DIR)
            .join(countdown_file(request.difficulty_value));
        let font_fp = self.static_dir.join("ttf").join("tccm.ttf");
        let poster_box_fp = self.static_dir.join("png").join("poster_box.png");
        let source = request.source_fp.display().to_string();

        let mut args: Vec<String> = vec!["-y".into()];
        args.extend(["-i".into(), countdown_fp.display().to_string()]);
        args.extend([
            "-ss".into(),
            request.guess_start.clone(),
            "-t".into(),
            t.guess_dur.to_string(),
            "-i".into(),
            source.clone(),
        ]);
        args.extend([
            "-ss".into(),
            request.reveal_start.clone(),
            "-t".into(),
            t.reveal_dur.to_string(),
            "-i".into(),
            source,
        ]);
        if let Some(poster) = poster_fp {
            args.extend([
                "-loop".into(),
                "1".into(),
                "-t".into(),
                t.reveal_dur.to_string(),
                "-i".into(),
                poster.display().to_string(),
            ]);
            args.extend([
                "-loop".into(),
                "1".into(),
                "-t".into(),
                t.reveal_dur.to_string(),
                "-i".into(),
                poster_box_fp.display().to_string(),
            ]);
        }

        let mut fc = String::new();

        // Reveal picture: fit to 1280x720, poster box in the lower left,
        // caption, fades.
        let _ = write!(
            fc,
            "[2:v]scale=1280:720:force_original_aspect_ratio=decrease,\
             pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1[rbase];"
        );
        let reveal_in = if poster_fp.is_some() {
            let _ = write!(
                fc,
                "[3:v]scale={POSTER_W}:{POSTER_H}[poster];\
                 [4:v][poster]overlay[pbox];\
                 [rbase][pbox]overlay=x={POSTER_X}:y={POSTER_Y}[rover];"
            );
            "[rover]"
        } else {
            "[rbase]"
        };
        let _ = write!(
            fc,
            "{reveal_in}drawtext=fontfile='{font}':text='{text}':x={TEXT_X}:y={TEXT_Y}:\
             fontsize=64:fontcolor=white:shadowx=4:shadowy=4:shadowcolor=0x000000cc:\
             borderw=1.5:bordercolor=black,\
             fade=t=in:st=0:d={rfi},fade=t=out:st={rd}:d={rod}[rv];",
            font = filter_escape(&font_fp.display().to_string()),
            text = filter_escape(&request.title_text),
            rfi = t.reveal_fade_in,
            rd = t.reveal_dur,
            rod = t.reveal_dur - t.reveal_fade_out,
        );

        // Countdown picture.
        let _ = write!(
            fc,
            "[0:v]fade=t=in:st=0:d={ad},fade=t=out:st={cst}:d={cfo}[cv];",
            ad = t.audio_delay,
            cst = t.countdown_dur() - t.countdown_fade_out,
            cfo = t.countdown_fade_out,
        );

        // Guess audio rides under the countdown, padded out to its length.
        let _ = write!(
            fc,
            "[1:a]afade=t=out:st={gst}:d={gfo},afade=t=in:st=0:d={gfi},\
             adelay={delay}:all=1,loudnorm=I={LOUDNORM_I},apad=pad_dur={pad}[ga];",
            gst = t.guess_dur - t.guess_fade_out,
            gfo = t.guess_fade_out,
            gfi = t.guess_fade_in,
            delay = (t.audio_delay * 1000.0) as i64,
            pad = t.countdown_dur() - t.audio_delay - t.guess_dur,
        );

        let _ = write!(
            fc,
            "[2:a]afade=t=out:st={rst}:d={rfo},afade=t=in:st=0:d={rfi},\
             loudnorm=I={LOUDNORM_I}[ra];",
            rst = t.reveal_dur - t.reveal_fade_out,
            rfo = t.reveal_fade_out,
            rfi = t.reveal_fade_in,
        );

        let _ = write!(fc, "[cv][ga][rv][ra]concat=n=2:v=1:a=1[outv][outa]");

        args.extend(["-filter_complex".into(), fc]);
        args.extend(["-map".into(), "[outv]".into(), "-map".into(), "[outa]".into()]);
        args.extend(["-c:v".into(), "libx265".into(), "-c:a".into(), "aac".into()]);
        args.extend(["-r".into(), FPS.to_string()]);
        args.push(request.output_fp.display().to_string());
        args
    }
}

#[async_trait]
impl VideoMaker for ClassicMaker {
    fn style(&self) -> &'static str {
        super::STYLE_CLASSIC
    }

    async fn render(&self, request: &RenderRequest) -> Result<()> {
        if let Some(parent) = request.output_fp.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let poster_dir = tempfile_dir(&request.output_fp);
        let poster_fp = match &request.poster_url {
            Some(url) => {
                let dest = poster_dir.join("poster.img");
                tokio::fs::create_dir_all(&poster_dir).await?;
                match self.fetch_poster(url, &dest).await {
                    Ok(()) => Some(dest),
                    Err(e) => {
                        debug!("Poster fetch failed, rendering without: {e:#}");
                        None
                    }
                }
            }
            None => None,
        };

        let args = self.build_args(request, poster_fp.as_deref());
        let result = run_ffmpeg(&args).await;
        tokio::fs::remove_dir_all(&poster_dir).await.ok();
        result
    }
}

/// Scratch directory next to the output file, unique per render target.
fn tempfile_dir(output_fp: &Path) -> PathBuf {
    let stem = output_fp
        .file_stem()
        .map_or_else(|| "render".to_string(), |s| s.to_string_lossy().to_string());
    output_fp
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{stem}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RenderRequest {
        RenderRequest {
            source_fp: PathBuf::from("/videos/sources/local/1.mkv"),
            guess_start: "00:00:30".to_string(),
            reveal_start: "00:01:00".to_string(),
            difficulty_value: 45,
            title_text: "Cowboy Bebop OP 1".to_string(),
            number: 1,
            poster_url: None,
            output_fp: PathBuf::from("/videos/quizparts/7.mkv"),
        }
    }

    #[test]
    fn args_without_poster_use_three_inputs() {
        let maker = ClassicMaker::new(Path::new("/static"));
        let args = maker.build_args(&request(), None);
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        let fc = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(fc.contains("[rbase]drawtext"));
        assert!(fc.contains("concat=n=2:v=1:a=1"));
    }

    #[test]
    fn args_with_poster_add_overlay_chain() {
        let maker = ClassicMaker::new(Path::new("/static"));
        let args = maker.build_args(&request(), Some(Path::new("/tmp/p.img")));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 5);
        let fc = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(fc.contains("overlay=x=70:y=360"));
    }

    #[test]
    fn countdown_clip_follows_difficulty() {
        let maker = ClassicMaker::new(Path::new("/static"));
        let args = maker.build_args(&request(), None);
        assert!(args.iter().any(|a| a.ends_with("medium.mkv")));
    }

    #[test]
    fn text_is_escaped() {
        assert_eq!(filter_escape("it's: a test"), r"it\'s\: a test");
    }

    #[test]
    fn timecodes_pass_through_to_seek_args() {
        let maker = ClassicMaker::new(Path::new("/static"));
        let args = maker.build_args(&request(), None);
        assert!(args.windows(2).any(|w| w[0] == "-ss" && w[1] == "00:00:30"));
        assert!(args.windows(2).any(|w| w[0] == "-ss" && w[1] == "00:01:00"));
    }
}
