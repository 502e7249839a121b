//! Final quiz assembly: stream-copy concatenation of already-rendered parts
//! via ffmpeg's concat demuxer.

use anyhow::Result;
use std::path::Path;

use super::run_ffmpeg;

/// Concat demuxer list entry; single quotes in paths are closed, escaped and
/// reopened per the demuxer's quoting rules.
fn list_line(path: &str) -> String {
    format!("file '{}'\n", path.replace('\'', r"'\''"))
}

pub async fn concat(inputs: &[String], output_fp: &Path) -> Result<()> {
    anyhow::ensure!(!inputs.is_empty(), "nothing to concatenate");
    if let Some(parent) = output_fp.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let list_fp = output_fp.with_extension("list.txt");
    let mut list = String::new();
    for input in inputs {
        list.push_str(&list_line(input));
    }
    tokio::fs::write(&list_fp, &list).await?;

    let args: Vec<String> = vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_fp.display().to_string(),
        "-c".into(),
        "copy".into(),
        output_fp.display().to_string(),
    ];

    let result = run_ffmpeg(&args).await;
    tokio::fs::remove_file(&list_fp).await.ok();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(list_line("/a/b.mkv"), "file '/a/b.mkv'\n");
        assert_eq!(list_line("/a/it's.mkv"), "file '/a/it'\\''s.mkv'\n");
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let out = Path::new("/tmp/quiz.mp4");
        assert!(concat(&[], out).await.is_err());
    }
}
