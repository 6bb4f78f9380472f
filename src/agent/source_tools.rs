// PromptCut Source Tools - Probing & Toolchain Discovery
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// ffprobe wrappers used to validate a source before it is handed to FFmpeg,
// plus helpers for building safe subprocess arguments.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::ToolError;

/// Media extensions accepted for upload and for serving back to the browser.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "webm",
    "mp3", "wav", "aac", "ogg", "m4a",
];

/// Video containers accepted as an editing source.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm"];

/// FFmpeg treats an argument starting with `-` as an option even after `-i`.
/// Prefix such relative paths with `./` so they are read as files.
pub fn safe_arg_path(path: &Path) -> PathBuf {
    if path.to_string_lossy().starts_with('-') {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Reduce an uploaded filename to `[A-Za-z0-9._-]`, dropping any directory part.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Get the container duration in seconds via ffprobe.
pub async fn get_video_duration(path: &Path) -> Result<f64, ToolError> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.display().to_string()));
    }

    let output = tokio::time::timeout(
        Duration::from_secs(10),
        Command::new("ffprobe")
            .kill_on_drop(true)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(safe_arg_path(path))
            .output(),
    )
    .await
    .map_err(|_| ToolError::TimedOut { tool: "ffprobe" })??;

    if !output.status.success() {
        return Err(ToolError::ToolFailed {
            tool: "ffprobe",
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .map_err(|_| ToolError::ToolFailed {
            tool: "ffprobe",
            detail: "could not parse duration".to_string(),
        })
}

/// True when `bin -version` (or `--version`) runs successfully.
pub async fn binary_available(bin: &str) -> bool {
    for flag in ["-version", "--version"] {
        let ok = Command::new(bin)
            .arg(flag)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        if ok {
            return true;
        }
    }
    debug!("[SOURCE] '{}' not available", bin);
    false
}
