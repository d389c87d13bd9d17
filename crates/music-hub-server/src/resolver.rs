//! Remote decoding node client.
//!
//! Turns file paths and queries into playable [`TrackHandle`]s. The node's
//! JSON shapes are converted here and nowhere else.

use std::time::Duration;

use async_trait::async_trait;
use music_hub_types::{LoadResult, LoadType, TrackHandle};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("resolver request failed: {0}")]
    Transport(String),
    #[error("resolver returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("resolver response could not be decoded: {0}")]
    Decode(String),
    #[error("resolver failed to load track: {0}")]
    Remote(String),
}

/// Anything that can resolve an identifier into tracks.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve an absolute file path or a scheme-prefixed query.
    async fn load(&self, identifier: &str) -> Result<LoadResult, ResolveError>;
}

/// REST client for a Lavalink v4 node.
#[derive(Clone)]
pub struct LavalinkClient {
    base_url: String,
    password: Option<String>,
    http: reqwest::Client,
}

impl LavalinkClient {
    pub fn new(base_url: &str, password: Option<String>) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ResolveError::Transport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            password,
            http,
        })
    }

    fn load_url(&self, identifier: &str) -> String {
        format!(
            "{}/v4/loadtracks?identifier={}",
            self.base_url,
            urlencoding::encode(identifier)
        )
    }
}

#[async_trait]
impl TrackResolver for LavalinkClient {
    async fn load(&self, identifier: &str) -> Result<LoadResult, ResolveError> {
        let mut req = self.http.get(self.load_url(identifier));
        if let Some(password) = self.password.as_deref() {
            req = req.header(reqwest::header::AUTHORIZATION, password);
        }
        let resp = req
            .send()
            .await
            .map_err(|err| ResolveError::Transport(err.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ResolveError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let raw = resp
            .json::<RawLoadResult>()
            .await
            .map_err(|err| ResolveError::Decode(err.to_string()))?;
        let result = raw.into_load_result()?;
        tracing::debug!(
            identifier,
            load_type = ?result.load_type,
            tracks = result.tracks.len(),
            "resolved identifier"
        );
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "loadType", content = "data", rename_all = "lowercase")]
enum RawLoadResult {
    Track(RawTrack),
    Playlist(RawPlaylist),
    Search(Vec<RawTrack>),
    Empty(serde_json::Value),
    Error(RawException),
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    encoded: String,
    info: RawTrackInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrackInfo {
    identifier: String,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    is_stream: bool,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    info: RawPlaylistInfo,
    tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawPlaylistInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawException {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

impl RawTrack {
    fn into_handle(self) -> TrackHandle {
        TrackHandle {
            encoded: self.encoded,
            identifier: self.info.identifier,
            uri: self.info.uri,
            title: self.info.title,
            author: self.info.author,
            length_ms: self.info.length,
            is_stream: self.info.is_stream,
        }
    }
}

impl RawLoadResult {
    fn into_load_result(self) -> Result<LoadResult, ResolveError> {
        let result = match self {
            RawLoadResult::Track(track) => LoadResult {
                load_type: LoadType::Track,
                tracks: vec![track.into_handle()],
                playlist_name: None,
            },
            RawLoadResult::Playlist(playlist) => LoadResult {
                load_type: LoadType::Playlist,
                tracks: playlist.tracks.into_iter().map(RawTrack::into_handle).collect(),
                playlist_name: Some(playlist.info.name),
            },
            RawLoadResult::Search(tracks) => LoadResult {
                load_type: LoadType::Search,
                tracks: tracks.into_iter().map(RawTrack::into_handle).collect(),
                playlist_name: None,
            },
            RawLoadResult::Empty(_) => LoadResult::empty(),
            RawLoadResult::Error(exception) => {
                let message = exception.message.unwrap_or_else(|| "unknown error".to_string());
                let severity = exception.severity.unwrap_or_else(|| "unknown".to_string());
                return Err(ResolveError::Remote(format!("{message} ({severity})")));
            }
        };
        Ok(result)
    }
}

/// Turn free text into a node identifier.
///
/// URLs and absolute paths pass through; everything else becomes a search.
pub fn query_identifier(query: &str, search_prefix: &str) -> String {
    let query = strip_wrapping(query);
    if query.starts_with("http://") || query.starts_with("https://") || query.starts_with('/') {
        query.to_string()
    } else {
        format!("{search_prefix}{query}")
    }
}

/// Remove surrounding quotes, angle brackets and zero-width spaces.
pub fn strip_wrapping(raw: &str) -> &str {
    let s = raw.trim().trim_matches('\u{200b}');
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        let quoted = first == last && (first == b'"' || first == b'\'');
        if quoted || (first == b'<' && last == b'>') {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<LoadResult, ResolveError> {
        serde_json::from_str::<RawLoadResult>(raw)
            .expect("parse")
            .into_load_result()
    }

    #[test]
    fn track_response_becomes_single_handle() {
        let result = parse(
            r#"{"loadType":"track","data":{"encoded":"QAA","info":{
                "identifier":"/music/a.mp3","uri":"/music/a.mp3","title":"A",
                "author":"B","length":1000,"isStream":false,"isSeekable":true}}}"#,
        )
        .unwrap();
        assert_eq!(result.load_type, LoadType::Track);
        assert_eq!(result.tracks[0].identifier, "/music/a.mp3");
        assert_eq!(result.tracks[0].length_ms, 1000);
    }

    #[test]
    fn playlist_response_keeps_name_and_order() {
        let result = parse(
            r#"{"loadType":"playlist","data":{"info":{"name":"Mix","selectedTrack":-1},
                "pluginInfo":{},"tracks":[
                {"encoded":"1","info":{"identifier":"x","title":"one","author":"a","length":1}},
                {"encoded":"2","info":{"identifier":"y","title":"two","author":"a","length":2}}]}}"#,
        )
        .unwrap();
        assert_eq!(result.playlist_name.as_deref(), Some("Mix"));
        let ids: Vec<_> = result.tracks.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn empty_response_has_no_tracks() {
        let result = parse(r#"{"loadType":"empty","data":{}}"#).unwrap();
        assert!(result.first().is_none());
    }

    #[test]
    fn error_response_maps_to_remote_error() {
        let err = parse(
            r#"{"loadType":"error","data":{"message":"boom","severity":"common","cause":"x"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Remote(msg) if msg.contains("boom")));
    }

    #[test]
    fn query_identifier_prefixes_free_text() {
        assert_eq!(query_identifier("some song", "ytsearch:"), "ytsearch:some song");
        assert_eq!(
            query_identifier("<https://example.com/x>", "ytsearch:"),
            "https://example.com/x"
        );
        assert_eq!(query_identifier("\"/music/a.mp3\"", "ytsearch:"), "/music/a.mp3");
    }

    #[test]
    fn load_url_encodes_identifier() {
        let client = LavalinkClient::new("http://node:2333/", None).unwrap();
        assert_eq!(
            client.load_url("/music/a b.mp3"),
            "http://node:2333/v4/loadtracks?identifier=%2Fmusic%2Fa%20b.mp3"
        );
    }
}
