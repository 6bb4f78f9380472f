use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::core::{AgentCore, SourceVideo};
use crate::agent::health::HealthMonitor;
use crate::agent::previews::PreviewKind;
use crate::auth::{User, UserStore};
use crate::config::Config;
use crate::views::Views;

/// Oldest turns are dropped past this many.
pub const HISTORY_LIMIT: usize = 50;

pub struct KernelState {
    pub config: Config,
    pub core: AgentCore,
    pub users: UserStore,
    pub sessions: SessionStore,
    pub views: Views,
    pub health: HealthMonitor,
}

impl KernelState {
    pub fn new(config: Config, users: UserStore, views: Views) -> Self {
        let core = AgentCore::new(&config);
        Self {
            config,
            core,
            users,
            sessions: SessionStore::default(),
            views,
            health: HealthMonitor::new(60),
        }
    }

    /// Per-session upload directory.
    pub fn upload_dir(&self, session_id: &str) -> PathBuf {
        self.config.uploads_dir().join(session_id)
    }

    /// Delete everything a session wrote to disk.
    pub async fn discard_session_files(&self, session_id: &str) {
        self.core.previews.purge_session(session_id);
        let uploads = self.upload_dir(session_id);
        if uploads.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&uploads).await {
                warn!("[SESSION] Could not remove {:?}: {}", uploads, e);
            }
        }
    }

    /// Drop sessions idle for at least `max_idle`, with their files.
    pub async fn expire_idle_sessions(&self, max_idle: Duration) -> usize {
        let expired = self.sessions.remove_idle(max_idle);
        for session in &expired {
            info!("[SESSION] Expired idle session of '{}'", session.username);
            self.discard_session_files(&session.id).await;
        }
        expired.len()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatTurn {
    pub command: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveVideo {
    pub filename: String,
    pub source: SourceVideo,
}

/// Everything the dashboard knows about one logged-in browser.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub username: String,
    pub active_video: Option<ActiveVideo>,
    pub history: VecDeque<ChatTurn>,
    pub previews: BTreeMap<PreviewKind, Vec<PathBuf>>,
    pub last_seen: Instant,
}

impl Session {
    fn new(user: &User) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            username: user.username.clone(),
            active_video: None,
            history: VecDeque::new(),
            previews: BTreeMap::new(),
            last_seen: Instant::now(),
        }
    }

    pub fn push_turn(&mut self, command: &str, response: &str) {
        self.history.push_back(ChatTurn {
            command: command.to_string(),
            response: response.to_string(),
        });
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    /// The current preview of `kind`, if every file of it is still on disk.
    pub fn existing_preview(&self, kind: PreviewKind) -> Option<&[PathBuf]> {
        self.previews
            .get(&kind)
            .filter(|paths| !paths.is_empty() && paths.iter().all(|p| p.exists()))
            .map(|paths| paths.as_slice())
    }
}

/// In-memory session table. The lock is only held for map operations.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn create(&self, user: &User) -> Session {
        let session = Session::new(user);
        self.lock().insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.lock().get(id).cloned()
    }

    /// Like `get`, but marks the session as active now.
    pub fn touch(&self, id: &str) -> Option<Session> {
        self.lock().get_mut(id).map(|s| {
            s.last_seen = Instant::now();
            s.clone()
        })
    }

    /// Remove and return every session not seen for at least `max_idle`.
    pub fn remove_idle(&self, max_idle: Duration) -> Vec<Session> {
        let mut map = self.lock();
        let idle: Vec<String> = map
            .values()
            .filter(|s| s.last_seen.elapsed() >= max_idle)
            .map(|s| s.id.clone())
            .collect();
        idle.iter().filter_map(|id| map.remove(id)).collect()
    }

    /// Apply `f` to the live session; `None` if it has been logged out meanwhile.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.lock().get_mut(id).map(f)
    }

    pub fn remove(&self, id: &str) -> Option<Session> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub type AppState = Arc<KernelState>;

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            password_hash: String::new(),
            created_at: 0,
        }
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::default();
        let a = store.create(&user());
        let b = store.create(&user());
        assert_ne!(a.id, b.id);

        store.update(&a.id, |s| s.push_turn("mute", "Muted the video."));
        assert_eq!(store.get(&a.id).unwrap().history.len(), 1);
        assert!(store.get(&b.id).unwrap().history.is_empty());

        assert!(store.remove(&a.id).is_some());
        assert!(store.update(&a.id, |_| ()).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_history_is_capped() {
        let store = SessionStore::default();
        let s = store.create(&user());
        store.update(&s.id, |s| {
            for i in 0..(HISTORY_LIMIT + 5) {
                s.push_turn(&format!("cmd {}", i), "ok");
            }
        });
        let history = store.get(&s.id).unwrap().history;
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history.front().unwrap().command, "cmd 5");
    }

    #[test]
    fn test_existing_preview_checks_disk() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("muted.mp4");
        std::fs::write(&present, b"x").unwrap();

        let mut session = Session::new(&user());
        session.previews.insert(PreviewKind::Muted, vec![present.clone()]);
        session
            .previews
            .insert(PreviewKind::Split, vec![present, dir.path().join("gone.mp4")]);

        assert!(session.existing_preview(PreviewKind::Muted).is_some());
        assert!(session.existing_preview(PreviewKind::Split).is_none());
        assert!(session.existing_preview(PreviewKind::Trimmed).is_none());
    }

    #[test]
    fn test_remove_idle_keeps_active_sessions() {
        let store = SessionStore::default();
        let a = store.create(&user());
        store.create(&user());

        assert!(store.remove_idle(Duration::from_secs(3600)).is_empty());
        assert_eq!(store.len(), 2);

        let expired = store.remove_idle(Duration::ZERO);
        assert_eq!(expired.len(), 2);
        assert!(store.is_empty());
        assert!(store.touch(&a.id).is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_lose_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_data_dir(dir.path());
        let users = UserStore::connect(&config.database_url).await.unwrap();
        let state = KernelState::new(config, users, Views::new().unwrap());

        let mut ids = Vec::new();
        for _ in 0..5 {
            let s = state.sessions.create(&user());
            let uploads = state.upload_dir(&s.id);
            std::fs::create_dir_all(&uploads).unwrap();
            std::fs::write(uploads.join("clip.mp4"), b"x").unwrap();
            let previews = state.core.previews.session_dir(&s.id);
            std::fs::create_dir_all(&previews).unwrap();
            std::fs::write(previews.join("muted-00.mp4"), b"x").unwrap();
            ids.push(s.id);
        }

        assert_eq!(state.expire_idle_sessions(Duration::from_secs(3600)).await, 0);
        assert_eq!(state.expire_idle_sessions(Duration::ZERO).await, 5);
        assert!(state.sessions.is_empty());
        for id in ids {
            assert!(!state.upload_dir(&id).exists());
            assert!(!state.core.previews.session_dir(&id).exists());
        }
    }
}
