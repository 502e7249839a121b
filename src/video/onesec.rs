//! The `onesec` style: a fixed intro clip, one second of the guess audio
//! played twice, then a five-second reveal with the theme number splashed
//! across the frame.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::{RenderRequest, VideoMaker, run_ffmpeg};

const GUESS_DUR: f64 = 1.0;
const REVEAL_DUR: f64 = 5.0;
const GUESS_DELAY_MS: i64 = 3000;
const LOUDNORM_I: f64 = -18.0;

pub struct OneSecMaker {
    static_dir: PathBuf,
}

impl OneSecMaker {
    #[must_use]
    pub fn new(static_dir: &Path) -> Self {
        Self {
            static_dir: static_dir.to_path_buf(),
        }
    }

    fn build_args(&self, request: &RenderRequest) -> Vec<String> {
        let intro_fp = self.static_dir.join("video").join("one_sec_guess_265.mp4");
        let font_fp = self.static_dir.join("ttf").join("VOGUE.TTF");
        let source = request.source_fp.display().to_string();

        let mut args: Vec<String> = vec!["-y".into()];
        args.extend(["-i".into(), intro_fp.display().to_string()]);
        args.extend([
            "-ss".into(),
            request.guess_start.clone(),
            "-t".into(),
            GUESS_DUR.to_string(),
            "-i".into(),
            source.clone(),
        ]);
        args.extend([
            "-ss".into(),
            request.reveal_start.clone(),
            "-t".into(),
            REVEAL_DUR.to_string(),
            "-i".into(),
            source,
        ]);

        let mut fc = String::new();
        let _ = write!(
            fc,
            "[2:v]scale=1280:720:force_original_aspect_ratio=decrease,\
             pad=1280:720:(ow-iw)/2:(oh-ih)/2,setsar=1,\
             fade=t=in:st=0:d=0.5,fade=t=out:st=4:d=1,\
             drawtext=fontfile='{font}':text='{number}':x=(1280-tw)/2:y=(720-th)/2:\
             fontsize=512:fontcolor=white:borderw=16:bordercolor=black[rv];",
            font = super::classic::filter_escape(&font_fp.display().to_string()),
            number = request.number,
        );
        // The one second of audio plays twice: once inside the intro, once
        // padded out so the cut to the reveal lands clean.
        let _ = write!(
            fc,
            "[1:a]aformat=channel_layouts=stereo|mono,loudnorm=I={LOUDNORM_I},asplit=2[g1][g2];\
             [g1]adelay={GUESS_DELAY_MS}:all=1[ga1];\
             [g2]adelay={GUESS_DELAY_MS}:all=1,apad=pad_dur={REVEAL_DUR}[ga2];\
             [ga1][ga2]concat=n=2:v=0:a=1[ga];"
        );
        let _ = write!(
            fc,
            "[2:a]loudnorm=I={LOUDNORM_I},afade=t=out:st=4:d=1,afade=t=in:st=0:d=0.5[ra];\
             [0:v][ga][rv][ra]concat=n=2:v=1:a=1[outv][outa]"
        );

        args.extend(["-filter_complex".into(), fc]);
        args.extend(["-map".into(), "[outv]".into(), "-map".into(), "[outa]".into()]);
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "faster".into(),
            "-c:a".into(),
            "aac".into(),
        ]);
        args.push(request.output_fp.display().to_string());
        args
    }
}

#[async_trait]
impl VideoMaker for OneSecMaker {
    fn style(&self) -> &'static str {
        super::STYLE_ONESEC
    }

    async fn render(&self, request: &RenderRequest) -> Result<()> {
        if let Some(parent) = request.output_fp.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        run_ffmpeg(&self.build_args(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_number_not_title() {
        let maker = OneSecMaker::new(Path::new("/static"));
        let request = RenderRequest {
            source_fp: PathBuf::from("/v/src.mkv"),
            guess_start: "00:00:10".to_string(),
            reveal_start: "00:00:10".to_string(),
            difficulty_value: 0,
            title_text: "Should Not Appear".to_string(),
            number: 4,
            poster_url: None,
            output_fp: PathBuf::from("/v/out.mkv"),
        };
        let args = maker.build_args(&request);
        let fc = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(fc.contains("text='4'"));
        assert!(!fc.contains("Should Not Appear"));
    }

    #[test]
    fn equal_guess_and_reveal_timecodes_are_accepted() {
        let maker = OneSecMaker::new(Path::new("/static"));
        let request = RenderRequest {
            source_fp: PathBuf::from("/v/src.mkv"),
            guess_start: "00:00:30".to_string(),
            reveal_start: "00:00:30".to_string(),
            difficulty_value: 50,
            title_text: String::new(),
            number: 1,
            poster_url: None,
            output_fp: PathBuf::from("/v/out.mkv"),
        };
        let args = maker.build_args(&request);
        assert_eq!(
            args.windows(2)
                .filter(|w| w[0] == "-ss" && w[1] == "00:00:30")
                .count(),
            2
        );
    }
}
