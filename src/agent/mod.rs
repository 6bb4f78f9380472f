// PromptCut Agent Modules
// Copyright (c) 2026 Xing_The_Creator | PromptCut

pub mod core;
pub mod health;
pub mod intent;
pub mod previews;
pub mod production_tools;
pub mod responder;
pub mod source_tools;
pub mod voice;

use thiserror::Error;

/// Failures raised by the external media toolchain (FFmpeg, ffprobe, TTS).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{tool} failed: {detail}")]
    ToolFailed { tool: &'static str, detail: String },

    #[error("{tool} timed out")]
    TimedOut { tool: &'static str },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("no video uploaded yet")]
    NoSource,

    #[error("{0} not found")]
    MissingInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
