// PromptCut Health Check & Watchdog
// Copyright (c) 2026 Xing_The_Creator | PromptCut
//
// Startup toolchain discovery plus a background heartbeat that watches memory
// pressure, sweeps stale previews and expires idle sessions.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use sysinfo::SystemExt;
use tracing::{info, warn};

use crate::agent::source_tools::binary_available;
use crate::state::KernelState;

/// Which external binaries were found on `PATH`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolchainStatus {
    pub ffmpeg: bool,
    pub ffprobe: bool,
    pub tts: bool,
}

impl ToolchainStatus {
    pub fn missing(&self, tts_command: &str) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.ffmpeg {
            missing.push("ffmpeg".to_string());
        }
        if !self.ffprobe {
            missing.push("ffprobe".to_string());
        }
        if !self.tts {
            missing.push(tts_command.to_string());
        }
        missing
    }
}

pub async fn check_dependencies(tts_command: &str) -> ToolchainStatus {
    ToolchainStatus {
        ffmpeg: binary_available("ffmpeg").await,
        ffprobe: binary_available("ffprobe").await,
        tts: binary_available(tts_command).await,
    }
}

pub struct HealthMonitor {
    start_time: Instant,
    is_running: Arc<AtomicBool>,
    heartbeat_count: Arc<AtomicU64>,
    check_interval: Duration,
}

impl HealthMonitor {
    pub fn new(check_interval_secs: u64) -> Self {
        Self {
            start_time: Instant::now(),
            is_running: Arc::new(AtomicBool::new(false)),
            heartbeat_count: Arc::new(AtomicU64::new(0)),
            check_interval: Duration::from_secs(check_interval_secs.max(1)),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.heartbeat_count.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Start the heartbeat loop. Every tick sweeps previews and sessions idle
    /// longer than the configured preview TTL. The loop ends with the state.
    pub fn start(&self, state: Weak<KernelState>) {
        let is_running = self.is_running.clone();
        let heartbeat_count = self.heartbeat_count.clone();
        let interval = self.check_interval;

        is_running.store(true, Ordering::Relaxed);

        tokio::spawn(async move {
            info!("[HEALTH] Watchdog started (interval: {:?})", interval);

            while is_running.load(Ordering::Relaxed) {
                tokio::time::sleep(interval).await;

                let count = heartbeat_count.fetch_add(1, Ordering::Relaxed) + 1;

                if !check_memory_health() {
                    warn!("[HEALTH] Memory pressure detected (heartbeat #{})", count);
                }

                let Some(state) = state.upgrade() else {
                    break;
                };
                let (swept, expired) = sweep(&state).await;

                if count % 60 == 0 || expired > 0 {
                    info!(
                        "[HEALTH] System alive | Heartbeat #{} | swept {} file(s), expired {} session(s)",
                        count, swept, expired
                    );
                }
            }

            is_running.store(false, Ordering::Relaxed);
            info!("[HEALTH] Watchdog stopped.");
        });
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Relaxed);
        info!("[HEALTH] Shutdown requested.");
    }

    pub fn status_report(&self) -> String {
        let uptime = self.uptime_secs();
        format!(
            "PromptCut Health Report\n  Uptime: {}h {}m {}s\n  Heartbeats: {}\n  Status: {}",
            uptime / 3600,
            (uptime % 3600) / 60,
            uptime % 60,
            self.heartbeat_count(),
            if self.is_running() { "MONITORING" } else { "STOPPED" },
        )
    }
}

/// One housekeeping pass: stale preview files, then idle sessions.
pub async fn sweep(state: &KernelState) -> (usize, usize) {
    let ttl = state.config.preview_ttl;
    let store = state.core.previews.clone();
    let swept = tokio::task::spawn_blocking(move || store.purge_stale(ttl))
        .await
        .unwrap_or(0);
    let expired = state.expire_idle_sessions(ttl).await;
    (swept, expired)
}

/// Alert when more than 95% of system memory is in use.
fn check_memory_health() -> bool {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    if total == 0 {
        return true;
    }
    (sys.used_memory() as f64 / total as f64) < 0.95
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_lists_tts_command() {
        let status = ToolchainStatus { ffmpeg: true, ffprobe: false, tts: false };
        assert_eq!(status.missing("espeak-ng"), vec!["ffprobe", "espeak-ng"]);
    }

    #[tokio::test]
    async fn test_unknown_binary_reported_missing() {
        let status = check_dependencies("promptcut-no-such-tts-binary").await;
        assert!(!status.tts);
    }

    #[test]
    fn test_status_report_before_start() {
        let monitor = HealthMonitor::new(30);
        assert!(!monitor.is_running());
        assert!(monitor.status_report().contains("STOPPED"));
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_sessions() {
        use crate::auth::{User, UserStore};
        use crate::config::Config;
        use crate::views::Views;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_data_dir(dir.path());
        config.preview_ttl = Duration::ZERO;
        let users = UserStore::connect(&config.database_url).await.unwrap();
        let state = KernelState::new(config, users, Views::new().unwrap());

        let user = User {
            id: 1,
            username: "idle".to_string(),
            password_hash: String::new(),
            created_at: 0,
        };
        for _ in 0..3 {
            state.sessions.create(&user);
        }

        let (_, expired) = sweep(&state).await;
        assert_eq!(expired, 3);
        assert!(state.sessions.is_empty());
    }
}
