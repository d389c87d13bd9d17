use serde::{Deserialize, Serialize};

/// Kind of result returned by the remote decoding node for a load request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LoadType {
    /// A single track was loaded.
    Track,
    /// A playlist was loaded; every track belongs to it.
    Playlist,
    /// Search results, best match first.
    Search,
    /// Nothing matched the identifier.
    Empty,
    /// The node failed to load the identifier.
    Error,
}

/// Playable track handle issued by the remote decoding node.
///
/// `encoded` is opaque to the hub and is passed back verbatim when playing.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackHandle {
    /// Opaque encoded track blob.
    pub encoded: String,
    /// Source identifier (absolute path for local files).
    pub identifier: String,
    /// Source URI, if the node reports one.
    pub uri: Option<String>,
    /// Track title.
    pub title: String,
    /// Track author/artist.
    pub author: String,
    /// Track length in milliseconds.
    pub length_ms: u64,
    /// `true` for live streams.
    pub is_stream: bool,
}

/// Result of resolving one identifier.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoadResult {
    /// How the node interpreted the identifier.
    pub load_type: LoadType,
    /// Resolved tracks (possibly empty).
    pub tracks: Vec<TrackHandle>,
    /// Playlist name when `load_type` is `playlist`.
    pub playlist_name: Option<String>,
}

impl LoadResult {
    /// Build an empty result.
    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            tracks: Vec::new(),
            playlist_name: None,
        }
    }

    /// First track, unless the node reported an error.
    pub fn first(&self) -> Option<&TrackHandle> {
        match self.load_type {
            LoadType::Error | LoadType::Empty => None,
            _ => self.tracks.first(),
        }
    }
}

/// Counters recorded by the most recent library scan.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ScanStats {
    /// Audio files found on disk.
    pub total: usize,
    /// Cached entries reused without re-reading tags.
    pub cached: usize,
    /// Files whose tags were (re)read: stale plus added.
    pub updated: usize,
    /// Files not present in the cache at all.
    pub added: usize,
    /// Cached entries whose file is gone.
    pub removed: usize,
}

/// Outcome of a batch enqueue.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EnqueueSummary {
    /// Tracks appended to the queue.
    pub added: usize,
    /// Items that failed to resolve or append.
    pub failed: usize,
}

impl EnqueueSummary {
    /// Sum two partial summaries (warm-up plus bulk phase).
    pub fn merge(self, other: EnqueueSummary) -> Self {
        Self {
            added: self.added + other.added,
            failed: self.failed + other.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_type_uses_snake_case() {
        let raw = serde_json::to_string(&LoadType::Playlist).unwrap();
        assert_eq!(raw, "\"playlist\"");
    }

    #[test]
    fn first_skips_error_results() {
        let result = LoadResult {
            load_type: LoadType::Error,
            tracks: vec![TrackHandle::default()],
            playlist_name: None,
        };
        assert!(result.first().is_none());
    }

    #[test]
    fn merge_adds_counters() {
        let a = EnqueueSummary { added: 8, failed: 1 };
        let b = EnqueueSummary { added: 3, failed: 2 };
        assert_eq!(a.merge(b), EnqueueSummary { added: 11, failed: 3 });
    }
}
