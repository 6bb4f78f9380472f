use std::path::{Path, PathBuf};
use std::process::Command;
use promptcut_core::agent::core::{AgentCore, SourceVideo};
use promptcut_core::agent::production_tools;
use promptcut_core::agent::source_tools::get_video_duration;
use promptcut_core::agent::ToolError;
use promptcut_core::config::Config;

fn ffmpeg_available() -> bool {
    Command::new("ffmpeg").arg("-version").output().is_ok()
        && Command::new("ffprobe").arg("-version").output().is_ok()
}

/// Generate a 5 second test pattern with a sine tone.
fn make_clip(dir: &Path) -> PathBuf {
    let path = dir.join("input.mp4");
    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-f", "lavfi", "-i", "testsrc=duration=5:size=320x240:rate=25",
            "-f", "lavfi", "-i", "sine=frequency=440:duration=5",
            "-c:v", "libx264", "-g", "1",
            "-c:a", "aac", "-shortest",
        ])
        .arg(&path)
        .output()
        .expect("Failed to execute ffmpeg");

    if !status.status.success() {
        eprintln!("FFmpeg stderr: {}", String::from_utf8_lossy(&status.stderr));
        panic!("Failed to create dummy video");
    }
    path
}

#[tokio::test]
async fn test_trim_video_integration() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let output = dir.path().join("trimmed.mp4");

    let result = production_tools::trim_video(&input, 1.0, 3.0, &output).await;
    assert!(result.is_ok(), "trim_video failed: {:?}", result.err());
    let prod = result.unwrap();
    assert_eq!(prod.outputs, vec![output.clone()]);
    assert!(prod.size_mb > 0.0);
    assert!(leftover_scratch_files(dir.path()).is_empty());

    let duration = get_video_duration(&output).await.expect("Failed to get duration");
    assert!((duration - 2.0).abs() < 0.5, "Duration should be approx 2.0s, got {}", duration);
}

#[tokio::test]
async fn test_trim_out_of_range_fails_cleanly() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let output = dir.path().join("never.mp4");

    let err = production_tools::trim_video(&input, 2.0, 60.0, &output).await.unwrap_err();
    assert!(matches!(err, ToolError::InvalidRange(_)), "{:?}", err);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_split_video_integration() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let part1 = dir.path().join("p1.mp4");
    let part2 = dir.path().join("p2.mp4");

    production_tools::split_video(&input, 2.0, &part1, &part2)
        .await
        .expect("split failed");

    let d1 = get_video_duration(&part1).await.unwrap();
    let d2 = get_video_duration(&part2).await.unwrap();
    assert!((d1 - 2.0).abs() < 0.5, "first part {}", d1);
    assert!((d2 - 3.0).abs() < 0.5, "second part {}", d2);
}

#[tokio::test]
async fn test_mute_removes_audio() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let output = dir.path().join("muted.mp4");

    production_tools::mute_audio(&input, &output).await.expect("mute failed");

    let streams = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "a", "-show_entries", "stream=index", "-of", "csv=p=0"])
        .arg(&output)
        .output()
        .unwrap();
    assert!(String::from_utf8_lossy(&streams.stdout).trim().is_empty());
}

#[tokio::test]
async fn test_chat_command_reuses_preview() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let core = AgentCore::new(&Config::for_data_dir(dir.path()));
    let source = SourceVideo::from_path(&input).await.unwrap();

    let first = core.handle_prompt("s1", "Trim from 1 to 2 seconds", Some(&source)).await;
    assert_eq!(first.response, "Trimmed video from 1 to 2 seconds.");
    assert_eq!(first.outputs.len(), 1);
    let modified = std::fs::metadata(&first.outputs[0]).unwrap().modified().unwrap();

    let second = core.handle_prompt("s1", "trim 1 2", Some(&source)).await;
    assert_eq!(second.outputs, first.outputs);
    let again = std::fs::metadata(&second.outputs[0]).unwrap().modified().unwrap();
    assert_eq!(modified, again);

    let other = core.handle_prompt("s2", "Trim from 1 to 2 seconds", Some(&source)).await;
    assert_ne!(other.outputs, first.outputs);
}

fn drawtext_available() -> bool {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-filters"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("drawtext"))
        .unwrap_or(false)
}

/// A sine tone of `secs` seconds, encoded as MP3.
fn make_track(path: &Path, secs: u32) {
    let status = Command::new("ffmpeg")
        .args(["-y", "-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=220:duration={}", secs))
        .args(["-c:a", "libmp3lame"])
        .arg(path)
        .output()
        .expect("Failed to execute ffmpeg");
    assert!(status.status.success(), "{}", String::from_utf8_lossy(&status.stderr));
}

fn leftover_scratch_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".partial-"))
        .collect()
}

#[tokio::test]
async fn test_caption_with_filter_metacharacters() {
    if !ffmpeg_available() || !drawtext_available() {
        eprintln!("ffmpeg with drawtext not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let output = dir.path().join("captioned.mp4");

    let text = "it's 100% done: really";
    let result = production_tools::add_captions(&input, text, &output).await;
    assert!(result.is_ok(), "add_captions failed: {:?}", result.err());
    assert!(output.exists());
    assert!(leftover_scratch_files(dir.path()).is_empty());

    let duration = get_video_duration(&output).await.unwrap();
    assert!((duration - 5.0).abs() < 0.5, "got {}", duration);
}

#[tokio::test]
async fn test_short_music_is_looped_to_video_length() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let track = dir.path().join("short.mp3");
    make_track(&track, 2);
    let output = dir.path().join("music.mp4");

    production_tools::add_background_music(&input, &track, &output)
        .await
        .expect("music failed");

    let duration = get_video_duration(&output).await.unwrap();
    assert!((duration - 5.0).abs() < 0.5, "looped music should last ~5s, got {}", duration);
}

#[tokio::test]
async fn test_long_music_is_cut_to_video_length() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let track = dir.path().join("long.mp3");
    make_track(&track, 12);
    let output = dir.path().join("music.mp4");

    production_tools::add_background_music(&input, &track, &output)
        .await
        .expect("music failed");

    let duration = get_video_duration(&output).await.unwrap();
    assert!((duration - 5.0).abs() < 0.5, "music should be cut to ~5s, got {}", duration);
}

#[tokio::test]
async fn test_failed_encode_leaves_no_partial_files() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("garbage.mp4");
    std::fs::write(&input, b"this is not a video").unwrap();
    let output = dir.path().join("muted.mp4");

    let err = production_tools::mute_audio(&input, &output).await.unwrap_err();
    assert!(matches!(err, ToolError::ToolFailed { tool: "ffmpeg", .. }), "{:?}", err);
    assert!(!output.exists());
    assert!(leftover_scratch_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_identical_commands_in_parallel_share_one_result() {
    if !ffmpeg_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = make_clip(dir.path());
    let mut config = Config::for_data_dir(dir.path());
    config.max_encodes = 2;
    let core = AgentCore::new(&config);
    let source = SourceVideo::from_path(&input).await.unwrap();

    let (a, b) = tokio::join!(
        core.handle_prompt("s1", "mute", Some(&source)),
        core.handle_prompt("s1", "mute", Some(&source)),
    );
    assert_eq!(a.response, "Muted the video.");
    assert_eq!(b.response, "Muted the video.");
    assert_eq!(a.outputs, b.outputs);

    let session_dir = core.previews.session_dir("s1");
    assert!(leftover_scratch_files(&session_dir).is_empty());
    let duration = get_video_duration(&a.outputs[0]).await.unwrap();
    assert!((duration - 5.0).abs() < 0.5, "got {}", duration);
}
