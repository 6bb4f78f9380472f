// PromptCut Intent Dispatcher
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// Maps a free-text editing command onto one of the fixed operations.
// Patterns are tried in priority order and the first match wins.

use regex::Regex;
use std::sync::OnceLock;

use super::previews::PreviewKind;

/// Reply used when a prompt matches none of the editing patterns.
pub const FALLBACK_MESSAGE: &str = "Sorry, I didn't understand that command. Try 'Trim from 5 to 10 seconds' or 'Add captions: Hello world'.";

/// A parsed editing command. All times are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Trim { start: u32, end: u32 },
    Split { at: u32 },
    Caption { text: String },
    Mute,
    AddMusic { track: Option<String> },
    Unrecognized,
}

struct Patterns {
    trim: Regex,
    split: Regex,
    caption: Regex,
    mute: Regex,
    music: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        trim: Regex::new(r"trim.*?(\d+).*?(\d+)").expect("trim pattern"),
        split: Regex::new(r"split.*?(\d+)").expect("split pattern"),
        caption: Regex::new(r"(caption|subtitle).*?:\s*(.+)").expect("caption pattern"),
        mute: Regex::new(r"mute").expect("mute pattern"),
        music: Regex::new(r"music(?:[^:]*:\s*(.+))?").expect("music pattern"),
    })
}

impl Intent {
    /// Parse a prompt. Matching is done on the lowercased text.
    pub fn parse(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        let p = patterns();

        if let Some(caps) = p.trim.captures(&lower) {
            if let (Ok(start), Ok(end)) = (caps[1].parse(), caps[2].parse()) {
                return Intent::Trim { start, end };
            }
        }

        if let Some(caps) = p.split.captures(&lower) {
            if let Ok(at) = caps[1].parse() {
                return Intent::Split { at };
            }
        }

        if let Some(caps) = p.caption.captures(&lower) {
            let text = caps[2].trim();
            if !text.is_empty() {
                return Intent::Caption { text: text.to_string() };
            }
        }

        if p.mute.is_match(&lower) {
            return Intent::Mute;
        }

        if let Some(caps) = p.music.captures(&lower) {
            let track = caps
                .get(1)
                .map(|m| m.as_str().trim().to_string())
                .filter(|t| !t.is_empty());
            return Intent::AddMusic { track };
        }

        Intent::Unrecognized
    }

    /// The preview slot this command writes into.
    pub fn kind(&self) -> Option<PreviewKind> {
        match self {
            Intent::Trim { .. } => Some(PreviewKind::Trimmed),
            Intent::Split { .. } => Some(PreviewKind::Split),
            Intent::Caption { .. } => Some(PreviewKind::Captioned),
            Intent::Mute => Some(PreviewKind::Muted),
            Intent::AddMusic { .. } => Some(PreviewKind::MusicAdded),
            Intent::Unrecognized => None,
        }
    }

    /// Canonical argument string; feeds the content-addressed output key.
    pub fn canonical_args(&self) -> String {
        match self {
            Intent::Trim { start, end } => format!("{}-{}", start, end),
            Intent::Split { at } => at.to_string(),
            Intent::Caption { text } => text.clone(),
            Intent::Mute => String::new(),
            Intent::AddMusic { track } => track.clone().unwrap_or_default(),
            Intent::Unrecognized => String::new(),
        }
    }

    /// User-facing confirmation once the operation has completed.
    pub fn describe_success(&self) -> String {
        match self {
            Intent::Trim { start, end } => format!("Trimmed video from {} to {} seconds.", start, end),
            Intent::Split { at } => format!("Video split at {} seconds.", at),
            Intent::Caption { text } => format!("Caption added: {}", text),
            Intent::Mute => "Muted the video.".to_string(),
            Intent::AddMusic { .. } => "Background music added.".to_string(),
            Intent::Unrecognized => FALLBACK_MESSAGE.to_string(),
        }
    }
}
