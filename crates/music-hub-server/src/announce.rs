//! Outbound text notifications (idle goodbyes, "now playing").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use music_hub_types::TrackHandle;
use serde::Serialize;

use crate::local_paths::LocalPathMap;
use crate::session_registry::PlayerSession;

#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    #[error("announcement request failed: {0}")]
    Transport(String),
    #[error("announcement rejected with HTTP {0}")]
    Rejected(u16),
}

pub const QUEUE_END_TEXT: &str = "Queue finished.";

/// Delivers a line of text to a named target (a channel, a room, ...).
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn send(&self, target: &str, text: &str) -> Result<(), AnnounceError>;
}

/// Writes announcements to the log only.
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn send(&self, target: &str, text: &str) -> Result<(), AnnounceError> {
        tracing::info!(target_id = %target, text, "announce");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    content: &'a str,
}

/// Posts `{"content": text}` to `<base>/<target>`.
pub struct WebhookAnnouncer {
    base: String,
    http: reqwest::Client,
}

impl WebhookAnnouncer {
    pub fn new(base: &str) -> Result<Self, AnnounceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| AnnounceError::Transport(err.to_string()))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url_for(&self, target: &str) -> String {
        format!("{}/{}", self.base, urlencoding::encode(target))
    }
}

#[async_trait]
impl Announcer for WebhookAnnouncer {
    async fn send(&self, target: &str, text: &str) -> Result<(), AnnounceError> {
        let resp = self
            .http
            .post(self.url_for(target))
            .json(&WebhookBody { content: text })
            .send()
            .await
            .map_err(|err| AnnounceError::Transport(err.to_string()))?;
        if !resp.status().is_success() {
            return Err(AnnounceError::Rejected(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Webhook announcer when a base URL is configured, log announcer otherwise.
pub fn announcer_for(webhook_base: Option<&str>) -> anyhow::Result<Arc<dyn Announcer>> {
    match webhook_base {
        Some(base) => {
            tracing::info!(webhook_base = %base, "announcements go to webhook");
            Ok(Arc::new(WebhookAnnouncer::new(base)?))
        }
        None => Ok(Arc::new(LogAnnouncer)),
    }
}

/// "Now playing" line for a track, naming the local file when known.
pub fn now_playing_text(track: &TrackHandle, local_paths: &LocalPathMap) -> String {
    let mut text = if track.author.is_empty() {
        format!("Now playing: {}", track.title)
    } else {
        format!("Now playing: {} - {}", track.author, track.title)
    };
    if let Some(name) = local_paths
        .lookup(track)
        .and_then(|path| path.file_name().map(|n| n.to_string_lossy().to_string()))
    {
        text.push_str(&format!(" ({name})"));
    }
    text
}

/// Announce `track` on the session's target unless it was just announced.
/// Returns whether a message was sent.
pub async fn announce_now_playing(
    announcer: &dyn Announcer,
    session: &PlayerSession,
    track: &TrackHandle,
    local_paths: &LocalPathMap,
    dedup_window: Duration,
) -> bool {
    let Some(target) = session.context().announce_target else {
        return false;
    };
    if !session.should_announce(track, dedup_window) {
        tracing::debug!(session_id = %session.id(), track = %track.identifier, "duplicate announcement suppressed");
        return false;
    }
    let text = now_playing_text(track, local_paths);
    match announcer.send(&target, &text).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(session_id = %session.id(), error = %err, "now playing announcement failed");
            false
        }
    }
}

/// Tell the session's target that the queue ran out. Returns whether a
/// message was sent.
pub async fn announce_queue_end(announcer: &dyn Announcer, session: &PlayerSession) -> bool {
    let Some(target) = session.context().announce_target else {
        return false;
    };
    match announcer.send(&target, QUEUE_END_TEXT).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(session_id = %session.id(), error = %err, "queue end announcement failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use super::*;
    use crate::session_registry::SessionContext;

    #[derive(Default)]
    struct Collecting {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Announcer for Collecting {
        async fn send(&self, target: &str, text: &str) -> Result<(), AnnounceError> {
            self.sent
                .lock()
                .unwrap()
                .push((target.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn track() -> TrackHandle {
        TrackHandle {
            identifier: "/m/a.flac".to_string(),
            title: "Song".to_string(),
            author: "Band".to_string(),
            ..TrackHandle::default()
        }
    }

    #[test]
    fn now_playing_text_names_local_file() {
        let map = LocalPathMap::new();
        assert_eq!(now_playing_text(&track(), &map), "Now playing: Band - Song");
        map.insert("/m/a.flac", Path::new("/m/a.flac"));
        assert_eq!(
            now_playing_text(&track(), &map),
            "Now playing: Band - Song (a.flac)"
        );
    }

    #[test]
    fn webhook_url_encodes_target() {
        let announcer = WebhookAnnouncer::new("http://hooks.local/send/").unwrap();
        assert_eq!(announcer.url_for("room 1"), "http://hooks.local/send/room%201");
    }

    #[tokio::test]
    async fn repeated_now_playing_is_suppressed() {
        let announcer = Collecting::default();
        let session = PlayerSession::new("g1", SessionContext::new(Some("chan".to_string())));
        let map = LocalPathMap::new();
        let window = Duration::from_secs(5);

        assert!(announce_now_playing(&announcer, &session, &track(), &map, window).await);
        assert!(!announce_now_playing(&announcer, &session, &track(), &map, window).await);
        assert_eq!(announcer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queue_end_goes_to_the_session_target() {
        let announcer = Collecting::default();
        let session = PlayerSession::new("g1", SessionContext::new(Some("chan".to_string())));
        assert!(announce_queue_end(&announcer, &session).await);
        assert_eq!(
            *announcer.sent.lock().unwrap(),
            vec![("chan".to_string(), QUEUE_END_TEXT.to_string())]
        );

        let silent = PlayerSession::new("g2", SessionContext::default());
        assert!(!announce_queue_end(&announcer, &silent).await);
    }

    #[tokio::test]
    async fn sessions_without_target_stay_silent() {
        let announcer = Collecting::default();
        let session = PlayerSession::new("g1", SessionContext::default());
        let map = LocalPathMap::new();
        let sent =
            announce_now_playing(&announcer, &session, &track(), &map, Duration::from_secs(5))
                .await;
        assert!(!sent);
    }
}
