//! Stream probing for the local download backend.

use anyhow::Result;
use std::path::Path;

/// True when ffprobe reports at least one video and one audio stream. A
/// probe failure (missing file, not a media file) is `Ok(false)`, not an
/// error — the caller treats it as an invalid source either way.
pub async fn has_video_and_audio(path: &Path) -> Result<bool> {
    let path = path.to_path_buf();
    let info = tokio::task::spawn_blocking(move || ffprobe::ffprobe(&path)).await?;

    let Ok(info) = info else {
        return Ok(false);
    };

    let has = |kind: &str| {
        info.streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some(kind))
    };
    Ok(has("video") && has("audio"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let ok = has_video_and_audio(Path::new("/definitely/not/there.mkv"))
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn non_media_file_fails_the_probe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_video.mkv");
        std::fs::write(&path, b"plain text").unwrap();
        let ok = has_video_and_audio(&path).await.unwrap();
        assert!(!ok);
    }
}
