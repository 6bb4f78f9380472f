use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use crate::agent::production_tools::{partial_path, scratch_path};
use crate::agent::source_tools::safe_arg_path;
use crate::agent::ToolError;

/// Speech synthesis through an espeak-compatible CLI, transcoded to MP3 by FFmpeg.
#[derive(Debug, Clone)]
pub struct TtsEngine {
    command: String,
    voice: String,
}

impl TtsEngine {
    pub fn new(command: &str, voice: &str) -> Self {
        Self {
            command: command.to_string(),
            voice: voice.to_string(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub async fn speak(&self, text: &str, output_path: &Path) -> Result<PathBuf, ToolError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ToolError::ToolFailed {
                tool: "tts",
                detail: "nothing to say".to_string(),
            });
        }

        info!("[TTS] Generating audio: \"{}\" -> {:?}", text, output_path);

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text_file = scratch_path(output_path, "tts.txt");
        let wav_path = scratch_path(output_path, "tts.wav");
        tokio::fs::write(&text_file, text).await?;

        let result = self.synthesize(&text_file, &wav_path, output_path).await;

        let _ = tokio::fs::remove_file(&text_file).await;
        let _ = tokio::fs::remove_file(&wav_path).await;
        result.map(|_| output_path.to_path_buf())
    }

    async fn synthesize(&self, text_file: &Path, wav_path: &Path, output_path: &Path) -> Result<(), ToolError> {
        let synth = Command::new(&self.command)
            .arg("-v")
            .arg(&self.voice)
            .arg("-w")
            .arg(safe_arg_path(wav_path))
            .arg("-f")
            .arg(safe_arg_path(text_file))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                warn!("[TTS] Could not launch '{}': {}", self.command, e);
                ToolError::ToolFailed {
                    tool: "tts",
                    detail: format!("could not start {}: {}", self.command, e),
                }
            })?;

        if !synth.status.success() {
            return Err(ToolError::ToolFailed {
                tool: "tts",
                detail: String::from_utf8_lossy(&synth.stderr).trim().to_string(),
            });
        }

        let partial = partial_path(output_path);
        let encode = Command::new("ffmpeg")
            .args(["-y", "-nostdin", "-loglevel", "error", "-i"])
            .arg(safe_arg_path(wav_path))
            .args(["-codec:a", "libmp3lame", "-q:a", "4"])
            .arg(&partial)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !encode.status.success() {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ToolError::ToolFailed {
                tool: "ffmpeg",
                detail: String::from_utf8_lossy(&encode.stderr).trim().to_string(),
            });
        }

        tokio::fs::rename(&partial, output_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let engine = TtsEngine::new("espeak-ng", "en");
        let err = engine.speak("   ", Path::new("voice.mp3")).await.unwrap_err();
        assert!(matches!(err, ToolError::ToolFailed { tool: "tts", .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TtsEngine::new("promptcut-no-such-tts-binary", "en");
        let out = dir.path().join("voice.mp3");
        let err = engine.speak("hello", &out).await.unwrap_err();
        assert!(err.to_string().contains("could not start"));
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
