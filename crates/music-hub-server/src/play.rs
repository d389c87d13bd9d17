//! Single-request resolution: one local file, or a free-text query/URL.

use std::path::Path;

use music_hub_types::{LoadType, TrackHandle};

use crate::enqueue::{EnqueueError, EnqueueTarget};
use crate::resolver::{query_identifier, strip_wrapping};

/// What a play request queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOutcome {
    pub added: Vec<TrackHandle>,
    pub playlist_name: Option<String>,
}

/// Resolve a local file inside `base` and queue it.
pub async fn resolve_file(
    target: &EnqueueTarget<'_>,
    base: &Path,
    raw_input: &str,
) -> Result<PlayOutcome, EnqueueError> {
    let requested = Path::new(strip_wrapping(raw_input));
    let path = requested
        .canonicalize()
        .map_err(|_| EnqueueError::MissingFile(requested.to_path_buf()))?;
    if !path.starts_with(base) {
        return Err(EnqueueError::OutsideBase(requested.to_path_buf()));
    }

    let result = target.resolver.load(&path.to_string_lossy()).await?;
    let track = result.first().cloned().ok_or(EnqueueError::NoResults)?;
    target.queue.add(track.clone())?;
    target.local_paths.record(&track, &path);
    target.local_paths.insert(raw_input, &path);
    if let Err(err) = target.queue.ensure_playing(&track).await {
        tracing::warn!(error = %err, "ensure playing failed");
    }
    tracing::info!(path = %path.display(), title = %track.title, "queued local file");
    Ok(PlayOutcome {
        added: vec![track],
        playlist_name: None,
    })
}

/// Resolve a URL, absolute identifier or search text and queue the result.
///
/// Playlists queue every track; every other load type queues the first.
pub async fn resolve_query(
    target: &EnqueueTarget<'_>,
    query: &str,
    search_prefix: &str,
) -> Result<PlayOutcome, EnqueueError> {
    let identifier = query_identifier(query, search_prefix);
    if identifier.is_empty() || identifier == search_prefix {
        return Err(EnqueueError::EmptyRequest);
    }
    let result = target.resolver.load(&identifier).await?;
    let tracks = if result.load_type == LoadType::Playlist {
        result.tracks.clone()
    } else {
        result.first().cloned().into_iter().collect()
    };
    if tracks.is_empty() {
        return Err(EnqueueError::NoResults);
    }

    for track in &tracks {
        target.queue.add(track.clone())?;
        if track.identifier.starts_with('/') {
            target
                .local_paths
                .record(track, Path::new(&track.identifier));
        }
    }
    if let Err(err) = target.queue.ensure_playing(&tracks[0]).await {
        tracing::warn!(error = %err, "ensure playing failed");
    }
    tracing::info!(
        identifier = %identifier,
        queued = tracks.len(),
        playlist = result.playlist_name.as_deref().unwrap_or(""),
        "queued query result"
    );
    Ok(PlayOutcome {
        added: tracks,
        playlist_name: result.playlist_name,
    })
}

/// Absolute paths and existing relative files go through [`resolve_file`],
/// everything else is a query.
pub async fn resolve_input(
    target: &EnqueueTarget<'_>,
    base: &Path,
    input: &str,
    search_prefix: &str,
) -> Result<PlayOutcome, EnqueueError> {
    let candidate = Path::new(strip_wrapping(input));
    if candidate.is_absolute() || candidate.is_file() {
        resolve_file(target, base, input).await
    } else {
        resolve_query(target, input, search_prefix).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use music_hub_types::LoadResult;

    use super::*;
    use crate::enqueue::tests::{RecordingQueue, ScriptedResolver};
    use crate::local_paths::LocalPathMap;
    use crate::resolver::{ResolveError, TrackResolver};

    struct PlaylistResolver;

    #[async_trait]
    impl TrackResolver for PlaylistResolver {
        async fn load(&self, identifier: &str) -> Result<LoadResult, ResolveError> {
            assert_eq!(identifier, "https://example.com/list");
            let track = |id: &str| TrackHandle {
                identifier: id.to_string(),
                title: id.to_string(),
                ..TrackHandle::default()
            };
            Ok(LoadResult {
                load_type: LoadType::Playlist,
                tracks: vec![track("x"), track("y")],
                playlist_name: Some("Mix".to_string()),
            })
        }
    }

    #[tokio::test]
    async fn local_file_is_queued_and_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let file = base.join("song.mp3");
        std::fs::write(&file, b"x").unwrap();
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };
        let raw = format!("\"{}\"", file.display());

        let outcome = resolve_input(&target, &base, &raw, "ytsearch:").await.unwrap();

        assert_eq!(outcome.added.len(), 1);
        assert_eq!(local_paths.get(&raw), Some(file.clone()));
        assert_eq!(queue.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_outside_base_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("song.mp3");
        std::fs::write(&file, b"x").unwrap();
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let err = resolve_file(
            &target,
            &dir.path().canonicalize().unwrap(),
            &file.to_string_lossy(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EnqueueError::OutsideBase(_)));
        assert!(queue.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn relative_existing_file_is_treated_as_local() {
        let base = std::env::current_dir().unwrap().canonicalize().unwrap();
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let outcome = resolve_input(&target, &base, "Cargo.toml", "ytsearch:")
            .await
            .unwrap();

        let expected = base.join("Cargo.toml");
        assert_eq!(outcome.added[0].identifier, expected.to_string_lossy());
        assert_eq!(local_paths.get("Cargo.toml"), Some(expected));
    }

    #[tokio::test]
    async fn missing_absolute_path_never_reaches_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };
        let missing = base.join("gone.mp3");

        let err = resolve_input(&target, &base, &missing.to_string_lossy(), "ytsearch:")
            .await
            .unwrap_err();
        assert!(matches!(err, EnqueueError::MissingFile(_)));
        assert!(resolver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_text_uses_prefix_and_queues_first() {
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let outcome = resolve_input(&target, Path::new("/music"), "some song", "scsearch:")
            .await
            .unwrap();
        assert_eq!(outcome.added[0].identifier, "scsearch:some song");
        assert_eq!(local_paths.len(), 0);
    }

    #[tokio::test]
    async fn playlist_queues_every_track() {
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &PlaylistResolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let outcome = resolve_query(&target, "<https://example.com/list>", "ytsearch:")
            .await
            .unwrap();
        assert_eq!(outcome.playlist_name.as_deref(), Some("Mix"));
        assert_eq!(queue.items.lock().unwrap().len(), 2);
        assert_eq!(*queue.started.lock().unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn empty_result_is_no_results() {
        let resolver = ScriptedResolver::default().empty("/missing.mp3");
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let err = resolve_query(&target, "/missing.mp3", "ytsearch:")
            .await
            .unwrap_err();
        assert!(matches!(err, EnqueueError::NoResults));
        assert_eq!(local_paths.get("/missing.mp3"), None::<PathBuf>);
    }
}
