//! API models and OpenAPI schemas.
//!
//! Request/response structures for the hub HTTP API.

use music_hub_types::{ScanStats, TrackHandle};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::session_registry::SessionSnapshot;

/// Artist names in the library.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtistsResponse {
    pub artists: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlbumsQuery {
    /// Artist name; matched exactly, then case-insensitively.
    pub artist: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AlbumsResponse {
    /// Canonical artist name as stored in the index.
    pub artist: String,
    pub albums: Vec<String>,
}

/// Track filter; no fields means the whole library.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TracksQuery {
    pub artist: Option<String>,
    pub album: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TracksResponse {
    /// Absolute file paths in artist/album/track order.
    pub tracks: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LibraryBaseRequest {
    /// Directory to use as the new media root.
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LibraryBaseResponse {
    /// Canonical media root now in use.
    pub base: String,
    pub stats: ScanStats,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionCreateRequest {
    /// Session (guild/room) id.
    pub id: String,
    /// Where notifications for this session go.
    #[serde(default)]
    pub announce_target: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub id: String,
    pub connected: bool,
    pub playing: bool,
    pub current_title: Option<String>,
    pub queue_len: usize,
    pub announce_target: Option<String>,
}

impl From<SessionSnapshot> for SessionSummary {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            id: snapshot.id,
            connected: snapshot.connected,
            playing: snapshot.playing,
            current_title: snapshot.current.map(|t| t.title),
            queue_len: snapshot.queue.len(),
            announce_target: snapshot.announce_target,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionsListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Queue library tracks: everything, one artist, or one album.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EnqueueRequest {
    #[serde(default)]
    pub artist: Option<String>,
    /// Requires `artist`.
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub shuffle: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EnqueueResponse {
    /// Tracks selected from the library.
    pub requested: usize,
    pub added: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlayRequest {
    /// Absolute file path, URL, or search text.
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlayResponse {
    pub added: Vec<TrackHandle>,
    pub playlist_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueResponse {
    pub current: Option<TrackHandle>,
    pub items: Vec<TrackHandle>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SkipRequest {
    /// Tracks to skip, current one included. Defaults to 1.
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SkipToRequest {
    /// Queue position to jump to; 1 is the next track.
    pub index: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SkipResponse {
    pub skipped: usize,
    pub now_playing: Option<TrackHandle>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ClearRequest {
    /// Also stop the current track.
    #[serde(default)]
    pub stop: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StopResponse {
    /// Queued tracks dropped.
    pub removed: usize,
}
