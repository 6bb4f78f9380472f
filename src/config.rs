//! Runtime configuration, loaded from environment variables (and `.env`) at startup.

use std::path::PathBuf;
use std::time::Duration;

/// Every field has a default so the server runs without any environment set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to bind on `0.0.0.0` (default: `5000`, also honours `PORT`).
    pub port: u16,

    /// sqlx SQLite URL for the user table (default: `"sqlite://promptcut.db"`).
    pub database_url: String,

    /// Root of `uploads/`, `previews/`, `music/` and `audio/` (default: `"static"`).
    pub data_dir: PathBuf,

    /// espeak-compatible synthesizer binary.
    pub tts_command: String,
    pub tts_voice: String,

    /// OpenAI-compatible base URL for the free-text fallback; unset disables it.
    pub llm_url: Option<String>,
    pub llm_model: String,

    /// Concurrent FFmpeg encodes (default: CPU count).
    pub max_encodes: usize,

    pub max_upload_mb: usize,

    /// Previews untouched for this long are swept by the health monitor.
    pub preview_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PROMPTCUT_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        Self {
            port,
            database_url: env_or("PROMPTCUT_DATABASE_URL", "sqlite://promptcut.db"),
            data_dir: PathBuf::from(env_or("PROMPTCUT_DATA_DIR", "static")),
            tts_command: env_or("PROMPTCUT_TTS_COMMAND", "espeak-ng"),
            tts_voice: env_or("PROMPTCUT_TTS_VOICE", "en"),
            llm_url: std::env::var("PROMPTCUT_LLM_URL").ok().filter(|v| !v.trim().is_empty()),
            llm_model: env_or("PROMPTCUT_LLM_MODEL", "gpt2"),
            max_encodes: parse_env("PROMPTCUT_MAX_ENCODES", num_cpus::get()),
            max_upload_mb: parse_env("PROMPTCUT_MAX_UPLOAD_MB", 512),
            preview_ttl: ttl_from_hours(parse_env("PROMPTCUT_PREVIEW_TTL_HOURS", 24u64)),
        }
    }

    /// Configuration rooted at `data_dir` with an in-memory database; used by tests.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            data_dir: data_dir.into(),
            tts_command: "espeak-ng".to_string(),
            tts_voice: "en".to_string(),
            llm_url: None,
            llm_model: "gpt2".to_string(),
            max_encodes: 1,
            max_upload_mb: 16,
            preview_ttl: Duration::from_secs(3600),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn previews_dir(&self) -> PathBuf {
        self.data_dir.join("previews")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.data_dir.join("music")
    }

    /// Track used by "add music" when no name is given.
    pub fn default_music_track(&self) -> PathBuf {
        self.data_dir.join("audio").join("background.mp3")
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn ttl_from_hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_dirs() {
        let config = Config::for_data_dir("data");
        assert_eq!(config.uploads_dir(), PathBuf::from("data/uploads"));
        assert_eq!(config.previews_dir(), PathBuf::from("data/previews"));
        assert_eq!(config.music_dir(), PathBuf::from("data/music"));
        assert_eq!(config.default_music_track(), PathBuf::from("data/audio/background.mp3"));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        assert_eq!(ttl_from_hours(24), Duration::from_secs(86_400));
        assert_eq!(ttl_from_hours(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_parse_env_falls_back() {
        assert_eq!(parse_env("PROMPTCUT_TEST_UNSET_VALUE", 7usize), 7);
    }
}
