// PromptCut Preview Store - Content-Addressed Outputs
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// Every operation result lives under the owning session's directory and is
// named after a digest of (source content, operation, arguments). Repeating a
// command on the same upload reuses the file instead of re-encoding.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreviewKind {
    Trimmed,
    Split,
    Captioned,
    Muted,
    MusicAdded,
    Voice,
}

impl PreviewKind {
    pub const ALL: [PreviewKind; 6] = [
        PreviewKind::Trimmed,
        PreviewKind::Split,
        PreviewKind::Captioned,
        PreviewKind::Muted,
        PreviewKind::MusicAdded,
        PreviewKind::Voice,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            PreviewKind::Trimmed => "trimmed",
            PreviewKind::Split => "split",
            PreviewKind::Captioned => "captioned",
            PreviewKind::Muted => "muted",
            PreviewKind::MusicAdded => "music_added",
            PreviewKind::Voice => "voice",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PreviewKind::Voice => "mp3",
            _ => "mp4",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewStore {
    root: PathBuf,
}

impl PreviewStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    /// Output paths for one operation. Split yields two parts, everything else one.
    pub fn artifact_paths(
        &self,
        session_id: &str,
        kind: PreviewKind,
        source_digest: &str,
        args: &str,
    ) -> Vec<PathBuf> {
        let key = content_key(source_digest, kind, args);
        let dir = self.session_dir(session_id);
        match kind {
            PreviewKind::Split => vec![
                dir.join(format!("split_part1-{}.mp4", key)),
                dir.join(format!("split_part2-{}.mp4", key)),
            ],
            _ => vec![dir.join(format!("{}-{}.{}", kind.tag(), key, kind.extension()))],
        }
    }

    /// Drop a directory tree belonging to a finished session.
    pub fn purge_session(&self, session_id: &str) {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => info!("[PREVIEWS] Removed {:?}", dir),
                Err(e) => warn!("[PREVIEWS] Could not remove {:?}: {}", dir, e),
            }
        }
    }

    /// Remove preview files whose last modification is older than `max_age`.
    /// Returns the number of files removed.
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let age = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| now.duration_since(t).ok());
            if matches!(age, Some(a) if a > max_age) && std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("[PREVIEWS] Purged {} stale preview file(s)", removed);
        }
        removed
    }
}

/// First 16 hex chars of sha256(source ‖ kind ‖ args).
pub fn content_key(source_digest: &str, kind: PreviewKind, args: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_digest.as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.tag().as_bytes());
    hasher.update([0u8]);
    hasher.update(args.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// Streaming SHA-256 of a file, hex encoded.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let count = file.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
