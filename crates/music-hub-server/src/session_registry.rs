//! In-memory playback session registry.
//!
//! One [`PlayerSession`] per guild/room. Each session owns its queue, its
//! playback flags and an explicit [`SessionContext`] (announcement target and
//! "now playing" dedup state) instead of process-wide maps.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use music_hub_types::TrackHandle;

use crate::enqueue::PlaybackQueue;
use crate::idle_monitor::{MonitoredSession, SessionActivity, SessionSource};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is not connected")]
    NotConnected(String),
    #[error("unknown session {0}")]
    Unknown(String),
}

/// Per-session context handed to the components that announce things.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    /// Where notifications for this session go, if anywhere.
    pub announce_target: Option<String>,
    last_announced: Option<(String, Instant)>,
}

impl SessionContext {
    pub fn new(announce_target: Option<String>) -> Self {
        Self {
            announce_target,
            last_announced: None,
        }
    }

    /// Returns `false` when `track_key` was already announced within `window`.
    pub fn should_announce(&mut self, track_key: &str, now: Instant, window: Duration) -> bool {
        if track_key.is_empty() {
            return true;
        }
        if let Some((last, at)) = self.last_announced.as_ref() {
            if last == track_key && now.duration_since(*at) < window {
                return false;
            }
        }
        self.last_announced = Some((track_key.to_string(), now));
        true
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    connected: bool,
    playing: bool,
    current: Option<TrackHandle>,
    queue: VecDeque<TrackHandle>,
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: String,
    pub connected: bool,
    pub playing: bool,
    pub current: Option<TrackHandle>,
    pub queue: Vec<TrackHandle>,
    pub announce_target: Option<String>,
}

/// Playback session mirrored from the remote node.
#[derive(Debug)]
pub struct PlayerSession {
    id: String,
    state: Mutex<PlayerState>,
    context: Mutex<SessionContext>,
}

impl PlayerSession {
    pub fn new(id: impl Into<String>, context: SessionContext) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(PlayerState::default()),
            context: Mutex::new(context),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PlayerState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn connect(&self) {
        let mut state = self.state();
        if !state.connected {
            tracing::info!(session_id = %self.id, "session connected");
        }
        state.connected = true;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let announce_target = self.context().announce_target;
        let state = self.state();
        SessionSnapshot {
            id: self.id.clone(),
            connected: state.connected,
            playing: state.playing,
            current: state.current.clone(),
            queue: state.queue.iter().cloned().collect(),
            announce_target,
        }
    }

    pub fn context(&self) -> SessionContext {
        self.context
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    pub fn set_announce_target(&self, target: Option<String>) {
        let mut ctx = self.context.lock().unwrap_or_else(|err| err.into_inner());
        ctx.announce_target = target;
    }

    /// Dedup check for "now playing" announcements of this session.
    pub fn should_announce(&self, track: &TrackHandle, window: Duration) -> bool {
        let key = if track.identifier.is_empty() {
            track.uri.as_deref().unwrap_or("")
        } else {
            track.identifier.as_str()
        };
        let mut ctx = self.context.lock().unwrap_or_else(|err| err.into_inner());
        ctx.should_announce(key, Instant::now(), window)
    }

    /// Drop up to `count` tracks: the current one first, then queued ones.
    /// Returns how many were dropped.
    pub fn skip(&self, count: usize) -> usize {
        let mut state = self.state();
        let mut skipped = 0usize;
        if count > 0 && state.current.take().is_some() {
            skipped += 1;
        }
        while skipped < count && state.queue.pop_front().is_some() {
            skipped += 1;
        }
        Self::start_next(&mut state);
        skipped
    }

    /// Jump to queue position `index` (1 = next): the current track and the
    /// `index - 1` tracks before the target are dropped. Past the end the
    /// queue is emptied. Returns how many were dropped.
    pub fn skip_to(&self, index: usize) -> usize {
        let mut state = self.state();
        let before_target = (index.max(1) - 1).min(state.queue.len());
        state.queue.drain(..before_target);
        let mut skipped = before_target;
        if state.current.take().is_some() {
            skipped += 1;
        }
        state.playing = false;
        Self::start_next(&mut state);
        skipped
    }

    /// Current track ended; advance to the next queued one.
    pub fn finish_current(&self) -> Option<TrackHandle> {
        let mut state = self.state();
        state.current = None;
        state.playing = false;
        Self::start_next(&mut state);
        state.current.clone()
    }

    /// Empty the queue; when `stop` is set also drop the current track.
    pub fn clear(&self, stop: bool) -> usize {
        let mut state = self.state();
        let removed = state.queue.len();
        state.queue.clear();
        if stop {
            state.current = None;
            state.playing = false;
        }
        removed
    }

    fn start_next(state: &mut PlayerState) {
        if state.current.is_some() {
            return;
        }
        state.current = state.queue.pop_front();
        state.playing = state.current.is_some();
    }
}

#[async_trait]
impl PlaybackQueue for PlayerSession {
    fn add(&self, track: TrackHandle) -> Result<(), SessionError> {
        let mut state = self.state();
        if !state.connected {
            return Err(SessionError::NotConnected(self.id.clone()));
        }
        state.queue.push_back(track);
        Ok(())
    }

    async fn ensure_playing(&self, first: &TrackHandle) -> Result<(), SessionError> {
        let mut state = self.state();
        if !state.connected {
            return Err(SessionError::NotConnected(self.id.clone()));
        }
        if state.playing || state.current.is_some() || state.queue.is_empty() {
            return Ok(());
        }
        Self::start_next(&mut state);
        tracing::info!(
            session_id = %self.id,
            requested = %first.title,
            started = state.current.as_ref().map(|t| t.title.as_str()).unwrap_or(""),
            "playback started"
        );
        Ok(())
    }
}

#[async_trait]
impl MonitoredSession for PlayerSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn activity(&self) -> SessionActivity {
        let state = self.state();
        SessionActivity {
            connected: state.connected,
            playing: state.playing,
            has_current: state.current.is_some(),
            queue_len: state.queue.len(),
        }
    }

    fn announce_target(&self) -> Option<String> {
        self.context().announce_target
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let mut state = self.state();
        if !state.connected {
            return Err(SessionError::NotConnected(self.id.clone()));
        }
        *state = PlayerState::default();
        tracing::info!(session_id = %self.id, "session disconnected");
        Ok(())
    }
}

/// Registry of live sessions keyed by id.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, Arc<PlayerSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `id`, creating it when missing. An explicit
    /// announce target replaces the stored one.
    pub fn create_or_get(&self, id: &str, announce_target: Option<String>) -> Arc<PlayerSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(existing) = sessions.get(id) {
            if announce_target.is_some() {
                existing.set_announce_target(announce_target);
            }
            return existing.clone();
        }
        let session = Arc::new(PlayerSession::new(id, SessionContext::new(announce_target)));
        sessions.insert(id.to_string(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Result<Arc<PlayerSession>, SessionError> {
        self.sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::Unknown(id.to_string()))
    }

    /// Sessions sorted by id.
    pub fn list(&self) -> Vec<Arc<PlayerSession>> {
        let mut sessions: Vec<_> = self
            .sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .values()
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn remove(&self, id: &str) -> Option<Arc<PlayerSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(id)
    }
}

impl SessionSource for SessionRegistry {
    fn sessions(&self) -> Vec<Arc<dyn MonitoredSession>> {
        self.list()
            .into_iter()
            .map(|s| s as Arc<dyn MonitoredSession>)
            .collect()
    }
}
