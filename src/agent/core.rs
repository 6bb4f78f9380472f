// PromptCut Agent Core
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// Shared by the web server and the CLI: turns a parsed intent into a toolchain
// call, picks the content-addressed output paths, and converts failures into
// the text shown to the user.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::agent::intent::{Intent, FALLBACK_MESSAGE};
use crate::agent::previews::{sha256_file, PreviewKind, PreviewStore};
use crate::agent::production_tools::{self, EncodeLimiter};
use crate::agent::responder::Responder;
use crate::agent::source_tools::sanitize_filename;
use crate::agent::voice::TtsEngine;
use crate::agent::ToolError;
use crate::config::Config;

/// The video a command runs against, with its content digest.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVideo {
    pub path: PathBuf,
    pub digest: String,
}

impl SourceVideo {
    pub async fn from_path(path: &Path) -> Result<Self, ToolError> {
        Ok(Self {
            path: path.to_path_buf(),
            digest: hash_file(path).await?,
        })
    }
}

/// sha256 of a file, computed on the blocking pool.
pub async fn hash_file(path: &Path) -> Result<String, ToolError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&owned))
        .await
        .map_err(|e| ToolError::ToolFailed {
            tool: "sha256",
            detail: e.to_string(),
        })?
        .map_err(ToolError::from)
}

/// What a prompt produced: the text for the chat log, and any preview written.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    pub response: String,
    pub kind: Option<PreviewKind>,
    pub outputs: Vec<PathBuf>,
}

impl CommandReply {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            kind: None,
            outputs: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct AgentCore {
    pub previews: PreviewStore,
    pub limiter: EncodeLimiter,
    pub tts: TtsEngine,
    pub responder: Arc<Responder>,
    music_dir: PathBuf,
    default_track: PathBuf,
}

impl AgentCore {
    pub fn new(config: &Config) -> Self {
        Self {
            previews: PreviewStore::new(config.previews_dir()),
            limiter: EncodeLimiter::new(config.max_encodes),
            tts: TtsEngine::new(&config.tts_command, &config.tts_voice),
            responder: Arc::new(Responder::new(config.llm_url.as_deref(), &config.llm_model)),
            music_dir: config.music_dir(),
            default_track: config.default_music_track(),
        }
    }

    /// Named tracks live in the music directory; no name means the default track.
    pub fn resolve_music(&self, track: Option<&str>) -> PathBuf {
        match track {
            Some(name) => {
                let stem = sanitize_filename(name);
                let stem = stem.strip_suffix(".mp3").unwrap_or(&stem);
                self.music_dir.join(format!("{}.mp3", stem))
            }
            None => self.default_track.clone(),
        }
    }

    /// Web call site: unrecognized prompts get the fixed help message.
    pub async fn handle_prompt(
        &self,
        session_id: &str,
        prompt: &str,
        source: Option<&SourceVideo>,
    ) -> CommandReply {
        let intent = Intent::parse(prompt);
        if intent == Intent::Unrecognized {
            return CommandReply::text(FALLBACK_MESSAGE);
        }
        self.run_to_reply(session_id, &intent, source).await
    }

    /// CLI call site: unrecognized prompts are answered by the text generator.
    pub async fn handle_prompt_with_fallback(
        &self,
        session_id: &str,
        prompt: &str,
        source: Option<&SourceVideo>,
    ) -> CommandReply {
        let intent = Intent::parse(prompt);
        if intent == Intent::Unrecognized {
            return CommandReply::text(self.responder.reply(prompt).await);
        }
        self.run_to_reply(session_id, &intent, source).await
    }

    async fn run_to_reply(
        &self,
        session_id: &str,
        intent: &Intent,
        source: Option<&SourceVideo>,
    ) -> CommandReply {
        let Some(source) = source else {
            return CommandReply::text("Upload a video first, then tell me what to do with it.");
        };

        match self.execute(session_id, intent, source).await {
            Ok(outputs) => CommandReply {
                response: intent.describe_success(),
                kind: intent.kind(),
                outputs,
            },
            Err(e) => {
                error!("[CORE] Command {:?} failed: {}", intent, e);
                CommandReply::text(format!("Command failed: {}", e))
            }
        }
    }

    /// Run one editing intent against `source`, reusing a previous identical result.
    pub async fn execute(
        &self,
        session_id: &str,
        intent: &Intent,
        source: &SourceVideo,
    ) -> Result<Vec<PathBuf>, ToolError> {
        let Some(kind) = intent.kind() else {
            return Err(ToolError::ToolFailed {
                tool: "dispatcher",
                detail: "unrecognized command".to_string(),
            });
        };

        let mut args = intent.canonical_args();
        let music = match intent {
            Intent::AddMusic { track } => {
                let music = self.resolve_music(track.as_deref());
                if !music.exists() {
                    return Err(ToolError::MissingInput(format!(
                        "music track '{}'",
                        track.as_deref().unwrap_or("background")
                    )));
                }
                let music_digest = hash_file(&music).await?;
                args = format!("{}:{}", args, music_digest);
                Some(music)
            }
            _ => None,
        };

        let outputs = self
            .previews
            .artifact_paths(session_id, kind, &source.digest, &args);
        if outputs.iter().all(|p| p.exists()) {
            info!("[CORE] Reusing cached {} preview for session {}", kind.tag(), session_id);
            return Ok(outputs);
        }

        let _permit = self.limiter.acquire().await;
        // An identical request may have finished while this one waited.
        if outputs.iter().all(|p| p.exists()) {
            return Ok(outputs);
        }
        let input = source.path.as_path();
        let result = match intent {
            Intent::Trim { start, end } => {
                production_tools::trim_video(input, *start as f64, *end as f64, &outputs[0]).await?
            }
            Intent::Split { at } => {
                production_tools::split_video(input, *at as f64, &outputs[0], &outputs[1]).await?
            }
            Intent::Caption { text } => production_tools::add_captions(input, text, &outputs[0]).await?,
            Intent::Mute => production_tools::mute_audio(input, &outputs[0]).await?,
            Intent::AddMusic { .. } => {
                // resolved above for every AddMusic intent
                let music = music.unwrap_or_else(|| self.default_track.clone());
                production_tools::add_background_music(input, &music, &outputs[0]).await?
            }
            Intent::Unrecognized => unreachable!("rejected before dispatch"),
        };

        Ok(result.outputs)
    }

    /// Synthesize a voice-over for `session_id`; identical text reuses the file.
    pub async fn voice_over(&self, session_id: &str, text: &str) -> Result<PathBuf, ToolError> {
        let outputs = self
            .previews
            .artifact_paths(session_id, PreviewKind::Voice, "tts", text.trim());
        let output = &outputs[0];
        if output.exists() {
            info!("[CORE] Reusing cached voice-over for session {}", session_id);
            return Ok(output.clone());
        }
        let _permit = self.limiter.acquire().await;
        if output.exists() {
            return Ok(output.clone());
        }
        self.tts.speak(text, output).await
    }
}
