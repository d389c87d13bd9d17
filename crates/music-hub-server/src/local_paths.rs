//! Track-key to local file mapping.
//!
//! Lets "now playing" lookups find the file behind a resolved track.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use music_hub_types::TrackHandle;

/// Shared, append-only map from track keys to local files.
///
/// Every write is a single-key upsert, so concurrent enqueues never need to
/// coordinate beyond the map's own lock.
#[derive(Clone, Default)]
pub struct LocalPathMap {
    inner: Arc<Mutex<HashMap<String, PathBuf>>>,
}

impl LocalPathMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, path: &Path) {
        let mut map = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        map.insert(key.into(), path.to_path_buf());
    }

    /// Record the handle's identifier, its uri, and the path itself.
    pub fn record(&self, track: &TrackHandle, path: &Path) {
        let keys = [
            Some(track.identifier.clone()),
            track.uri.clone(),
            Some(path.to_string_lossy().to_string()),
        ];
        for key in keys.into_iter().flatten().filter(|k| !k.is_empty()) {
            self.insert(key, path);
        }
    }

    /// Local file for `track`, trying identifier then uri.
    pub fn lookup(&self, track: &TrackHandle) -> Option<PathBuf> {
        self.get(&track.identifier)
            .or_else(|| track.uri.as_deref().and_then(|uri| self.get(uri)))
    }

    pub fn get(&self, key: &str) -> Option<PathBuf> {
        let map = self.inner.lock().unwrap_or_else(|err| err.into_inner());
        map.get(key).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_maps_identifier_uri_and_path() {
        let map = LocalPathMap::new();
        let track = TrackHandle {
            identifier: "id-1".to_string(),
            uri: Some("file:///m/a.mp3".to_string()),
            ..TrackHandle::default()
        };
        map.record(&track, Path::new("/m/a.mp3"));

        assert_eq!(map.len(), 3);
        assert_eq!(map.get("id-1"), Some(PathBuf::from("/m/a.mp3")));
        assert_eq!(map.get("/m/a.mp3"), Some(PathBuf::from("/m/a.mp3")));
        assert_eq!(map.lookup(&track), Some(PathBuf::from("/m/a.mp3")));
    }

    #[test]
    fn lookup_falls_back_to_uri() {
        let map = LocalPathMap::new();
        map.insert("file:///m/b.mp3", Path::new("/m/b.mp3"));
        let track = TrackHandle {
            identifier: "other".to_string(),
            uri: Some("file:///m/b.mp3".to_string()),
            ..TrackHandle::default()
        };
        assert_eq!(map.lookup(&track), Some(PathBuf::from("/m/b.mp3")));
    }
}
