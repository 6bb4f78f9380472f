// PromptCut Production Tools - Editing Operations
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// FFmpeg wrappers for the five editing operations. Each one reads the whole
// source, re-encodes, and writes to a `.partial` sibling that is renamed into
// place only when FFmpeg exits cleanly.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info};
use uuid::Uuid;

use super::source_tools::{get_video_duration, safe_arg_path};
use super::ToolError;

/// Result of a production operation
#[derive(Debug)]
pub struct ProductionResult {
    pub outputs: Vec<PathBuf>,
    pub size_mb: f64,
}

/// Bounds the number of FFmpeg encodes running at once.
#[derive(Debug, Clone)]
pub struct EncodeLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl EncodeLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // The semaphore is never closed, so acquisition cannot fail.
        self.permits
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("encode semaphore closed"))
    }
}

impl Default for EncodeLimiter {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

/// Trim a video to `[start, end)` seconds.
pub async fn trim_video(
    input: &Path,
    start: f64,
    end: f64,
    output: &Path,
) -> Result<ProductionResult, ToolError> {
    info!("[PROD] Trimming video: {:?} ({:.2}s -> {:.2}s)", input, start, end);

    if end <= start {
        return Err(ToolError::InvalidRange(format!(
            "end ({}s) must be after start ({}s)",
            end, start
        )));
    }
    let duration = get_video_duration(input).await?;
    if start >= duration || end > duration {
        return Err(ToolError::InvalidRange(format!(
            "{}s-{}s is outside the {:.2}s video",
            start, end, duration
        )));
    }

    let input = safe_arg_path(input);
    render("trim", &[output.to_path_buf()], |parts| {
        let mut args = ffargs(&["-ss", &start.to_string(), "-i"]);
        args.push(input.clone().into());
        args.extend(ffargs(&["-t", &(end - start).to_string()]));
        args.extend(h264_aac());
        args.push(parts[0].clone().into());
        args
    })
    .await
}

/// Split a video into `[0, at)` and `[at, end]`.
pub async fn split_video(
    input: &Path,
    at: f64,
    part1: &Path,
    part2: &Path,
) -> Result<ProductionResult, ToolError> {
    info!("[PROD] Splitting video: {:?} at {:.2}s", input, at);

    let duration = get_video_duration(input).await?;
    if at <= 0.0 || at >= duration {
        return Err(ToolError::InvalidRange(format!(
            "split point {}s is outside the {:.2}s video",
            at, duration
        )));
    }

    let input = safe_arg_path(input);
    render("split", &[part1.to_path_buf(), part2.to_path_buf()], |parts| {
        let mut args = ffargs(&["-i"]);
        args.push(input.clone().into());
        args.extend(ffargs(&["-t", &at.to_string()]));
        args.extend(h264_aac());
        args.push(parts[0].clone().into());
        args.extend(ffargs(&["-ss", &at.to_string()]));
        args.extend(h264_aac());
        args.push(parts[1].clone().into());
        args
    })
    .await
}

/// Burn `text` into the bottom of the frame for the whole clip.
pub async fn add_captions(
    input: &Path,
    text: &str,
    output: &Path,
) -> Result<ProductionResult, ToolError> {
    info!("[PROD] Adding caption to {:?}: \"{}\"", input, text);

    if !input.exists() {
        return Err(ToolError::MissingInput(input.display().to_string()));
    }

    // drawtext reads the caption from a file so user text never has to
    // survive filtergraph escaping.
    let text_file = scratch_path(output, "caption.txt");
    tokio::fs::write(&text_file, text).await?;

    let filter = format!(
        "drawtext=textfile={}:expansion=none:fontsize=40:fontcolor=white:x=(w-text_w)/2:y=h-text_h-20",
        quote_filter_value(&text_file.to_string_lossy())
    );

    let input = safe_arg_path(input);
    let result = render("caption", &[output.to_path_buf()], |parts| {
        let mut args = ffargs(&["-i"]);
        args.push(input.clone().into());
        args.extend(ffargs(&["-vf", &filter]));
        args.extend(h264_aac());
        args.push(parts[0].clone().into());
        args
    })
    .await;

    let _ = tokio::fs::remove_file(&text_file).await;
    result
}

/// Drop every audio stream, keep the video untouched.
pub async fn mute_audio(input: &Path, output: &Path) -> Result<ProductionResult, ToolError> {
    info!("[PROD] Muting audio: {:?}", input);

    if !input.exists() {
        return Err(ToolError::MissingInput(input.display().to_string()));
    }

    let input = safe_arg_path(input);
    render("mute", &[output.to_path_buf()], |parts| {
        let mut args = ffargs(&["-i"]);
        args.push(input.clone().into());
        args.extend(ffargs(&["-map", "0:v", "-c:v", "copy", "-an"]));
        args.push(parts[0].clone().into());
        args
    })
    .await
}

/// Replace the soundtrack with `music`, looped or cut to the video's length.
pub async fn add_background_music(
    video: &Path,
    music: &Path,
    output: &Path,
) -> Result<ProductionResult, ToolError> {
    info!("[PROD] Adding background music {:?} to {:?}", music, video);

    for path in [video, music] {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.display().to_string()));
        }
    }

    let video = safe_arg_path(video);
    let music = safe_arg_path(music);
    render("music", &[output.to_path_buf()], |parts| {
        let mut args = ffargs(&["-i"]);
        args.push(video.clone().into());
        args.extend(ffargs(&["-stream_loop", "-1", "-i"]));
        args.push(music.clone().into());
        args.extend(ffargs(&[
            "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-shortest",
        ]));
        args.push(parts[0].clone().into());
        args
    })
    .await
}

/// Run FFmpeg against `.partial` siblings of `outputs`, then move them into place.
async fn render<F>(
    label: &'static str,
    outputs: &[PathBuf],
    build_args: F,
) -> Result<ProductionResult, ToolError>
where
    F: FnOnce(&[PathBuf]) -> Vec<OsString>,
{
    for out in outputs {
        if let Some(parent) = out.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let partials: Vec<PathBuf> = outputs.iter().map(|p| partial_path(p)).collect();

    let mut full_args = ffargs(&["-y", "-nostdin", "-loglevel", "error"]);
    full_args.extend(build_args(&partials));

    let result = Command::new("ffmpeg")
        .args(&full_args)
        .stdin(Stdio::null())
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) => {
            remove_all(&partials).await;
            return Err(ToolError::ToolFailed {
                tool: "ffmpeg",
                detail: format!("could not start ffmpeg: {}", e),
            });
        }
    };

    if !output.status.success() {
        remove_all(&partials).await;
        let detail = last_stderr_line(&output.stderr);
        error!("[PROD] FFmpeg {} failed: {}", label, detail);
        return Err(ToolError::ToolFailed { tool: "ffmpeg", detail });
    }

    let mut size_bytes = 0u64;
    for (partial, out) in partials.iter().zip(outputs) {
        tokio::fs::rename(partial, out).await?;
        size_bytes += tokio::fs::metadata(out).await?.len();
    }
    let size_mb = size_bytes as f64 / 1_048_576.0;
    info!("[PROD] {} complete ({:.2} MB)", label, size_mb);

    Ok(ProductionResult {
        outputs: outputs.to_vec(),
        size_mb,
    })
}

/// `clip.mp4` -> `clip.partial-1a2b3c4d.mp4`; FFmpeg still sees the real container extension.
/// Every call returns a fresh name, so two writers of the same output never share a file.
pub fn partial_path(path: &Path) -> PathBuf {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    scratch_path(path, &ext)
}

/// Unique sibling of `path` ending in `suffix`.
pub fn scratch_path(path: &Path, suffix: &str) -> PathBuf {
    let tag = Uuid::new_v4().simple().to_string();
    path.with_extension(format!("partial-{}.{}", &tag[..8], suffix))
}

/// Single-quote a value for an FFmpeg filtergraph option.
pub fn quote_filter_value(value: &str) -> String {
    let normalized = value.replace('\\', "/");
    format!("'{}'", normalized.replace('\'', r"'\''"))
}

fn last_stderr_line(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string()
}

async fn remove_all(paths: &[PathBuf]) {
    for p in paths {
        let _ = tokio::fs::remove_file(p).await;
    }
}

fn ffargs(items: &[&str]) -> Vec<OsString> {
    items.iter().map(OsString::from).collect()
}

fn h264_aac() -> Vec<OsString> {
    ffargs(&[
        "-c:v", "libx264", "-preset", "veryfast", "-c:a", "aac", "-movflags", "+faststart",
    ])
}
