//! Idle auto-disconnect.
//!
//! Periodically inspects every session and disconnects the ones that stayed
//! connected but idle (nothing playing, nothing current, empty queue) for
//! longer than the configured threshold.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::announce::Announcer;
use crate::config::IdleSettings;
use crate::session_registry::SessionError;

/// What the monitor needs to know about a session on each tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionActivity {
    pub connected: bool,
    pub playing: bool,
    pub has_current: bool,
    pub queue_len: usize,
}

impl SessionActivity {
    pub fn is_idle(&self) -> bool {
        self.connected && !self.playing && !self.has_current && self.queue_len == 0
    }
}

#[async_trait]
pub trait MonitoredSession: Send + Sync {
    fn session_id(&self) -> &str;
    fn activity(&self) -> SessionActivity;
    fn announce_target(&self) -> Option<String>;
    async fn disconnect(&self) -> Result<(), SessionError>;
}

/// Enumerates the sessions to inspect.
pub trait SessionSource: Send + Sync {
    fn sessions(&self) -> Vec<Arc<dyn MonitoredSession>>;
}

pub struct IdleMonitor {
    source: Arc<dyn SessionSource>,
    announcer: Arc<dyn Announcer>,
    settings: IdleSettings,
    idle_since: HashMap<String, Instant>,
}

impl IdleMonitor {
    pub fn new(
        source: Arc<dyn SessionSource>,
        announcer: Arc<dyn Announcer>,
        settings: IdleSettings,
    ) -> Self {
        Self {
            source,
            announcer,
            settings,
            idle_since: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn idle_since(&self, session_id: &str) -> Option<Instant> {
        self.idle_since.get(session_id).copied()
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.settings.poll_period;
        tracing::info!(
            idle_secs = self.settings.idle_threshold.as_secs(),
            poll_secs = period.as_secs(),
            "idle monitor started"
        );
        loop {
            self.tick(Instant::now()).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
        tracing::info!("idle monitor stopped");
    }

    /// Inspect every session once. Returns the ids disconnected this tick.
    pub async fn tick(&mut self, now: Instant) -> Vec<String> {
        let sessions = self.source.sessions();
        self.idle_since
            .retain(|id, _| sessions.iter().any(|s| s.session_id() == id.as_str()));

        let mut disconnected = Vec::new();
        for session in sessions {
            let id = session.session_id().to_string();
            if !session.activity().is_idle() {
                self.idle_since.remove(&id);
                continue;
            }
            let since = *self.idle_since.entry(id.clone()).or_insert(now);
            if now.duration_since(since) < self.settings.idle_threshold {
                continue;
            }

            if let Some(target) = session.announce_target() {
                if let Err(err) = self.announcer.send(&target, &self.settings.message).await {
                    tracing::debug!(session_id = %id, error = %err, "idle announcement failed");
                }
            }
            match session.disconnect().await {
                Ok(()) => {
                    tracing::info!(session_id = %id, "disconnected idle session");
                    disconnected.push(id.clone());
                }
                Err(err) => {
                    tracing::warn!(session_id = %id, error = %err, "idle disconnect failed");
                }
            }
            self.idle_since.remove(&id);
        }
        disconnected
    }
}
