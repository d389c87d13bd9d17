//! Ordered concurrent enqueue.
//!
//! Resolves many local files through the remote node at once, but appends
//! them to the session queue in the order the caller gave them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use music_hub_types::{EnqueueSummary, TrackHandle};
use rand::seq::SliceRandom;
use tokio::sync::Semaphore;

use crate::local_paths::LocalPathMap;
use crate::resolver::{ResolveError, TrackResolver};
use crate::session_registry::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("no resolver configured")]
    NotConfigured,
    #[error("nothing to enqueue")]
    EmptyRequest,
    #[error("path is outside the configured music directory: {0}")]
    OutsideBase(PathBuf),
    #[error("file not found: {0}")]
    MissingFile(PathBuf),
    #[error("no tracks inside the configured music directory")]
    NothingAuthorized,
    #[error("nothing could be queued")]
    NothingQueued,
    #[error("no results")]
    NoResults,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Queue the pipeline appends into.
#[async_trait]
pub trait PlaybackQueue: Send + Sync {
    /// Append one track to the end of the queue.
    fn add(&self, track: TrackHandle) -> Result<(), SessionError>;
    /// Start playback if nothing is playing and the queue was idle.
    async fn ensure_playing(&self, first: &TrackHandle) -> Result<(), SessionError>;
}

/// Receives `(done, total)` after every finished resolution.
///
/// Calls arrive in completion order, so `done` grows by one per call but the
/// item that completed is not necessarily the `done`-th input.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, done: usize, total: usize);
}

/// Shifts a sub-batch counter onto a batch-wide one.
struct OffsetProgress<'a> {
    inner: &'a dyn ProgressObserver,
    offset: usize,
    total: usize,
}

impl ProgressObserver for OffsetProgress<'_> {
    fn on_progress(&self, done: usize, _total: usize) {
        self.inner.on_progress(self.offset + done, self.total);
    }
}

/// Logs progress every `every` completions, at most once per `min_interval`.
pub struct ThrottledProgress {
    label: String,
    every: usize,
    min_interval: Duration,
    state: Mutex<ThrottleState>,
}

#[derive(Default)]
struct ThrottleState {
    last_emit: Option<Instant>,
    last_done: usize,
    emitted: usize,
    finished: bool,
}

impl ThrottledProgress {
    pub fn new(label: impl Into<String>, every: usize, min_interval: Duration) -> Self {
        Self {
            label: label.into(),
            every,
            min_interval,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Number of progress lines emitted so far.
    pub fn emitted(&self) -> usize {
        self.state.lock().map(|s| s.emitted).unwrap_or(0)
    }

    /// Last `done` value seen.
    pub fn last_done(&self) -> usize {
        self.state.lock().map(|s| s.last_done).unwrap_or(0)
    }

    #[cfg(test)]
    fn finished(&self) -> bool {
        self.state.lock().map(|s| s.finished).unwrap_or(false)
    }

    pub fn finish(&self, summary: EnqueueSummary) {
        if let Ok(mut state) = self.state.lock() {
            state.finished = true;
        }
        tracing::info!(
            session_id = %self.label,
            done = self.last_done(),
            progress_lines = self.emitted(),
            added = summary.added,
            failed = summary.failed,
            "enqueue finished"
        );
    }
}

impl ProgressObserver for ThrottledProgress {
    fn on_progress(&self, done: usize, total: usize) {
        let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
        state.last_done = state.last_done.max(done);
        if self.every == 0 || done % self.every != 0 {
            return;
        }
        let now = Instant::now();
        if let Some(last) = state.last_emit {
            if now.duration_since(last) < self.min_interval {
                return;
            }
        }
        state.last_emit = Some(now);
        state.emitted += 1;
        let pct = done * 100 / total.max(1);
        tracing::info!(session_id = %self.label, done, total, pct, "enqueue progress");
    }
}

/// Collaborators shared by every enqueue call.
pub struct EnqueueTarget<'a> {
    pub resolver: &'a dyn TrackResolver,
    pub queue: &'a dyn PlaybackQueue,
    pub local_paths: &'a LocalPathMap,
}

impl EnqueueTarget<'_> {
    /// Resolve one local file; `None` on any failure.
    async fn resolve_path(&self, path: &Path) -> Option<TrackHandle> {
        let identifier = path.to_string_lossy();
        match self.resolver.load(&identifier).await {
            Ok(result) => {
                let track = result.first().cloned();
                if track.is_none() {
                    tracing::debug!(identifier = %identifier, "resolver returned no tracks");
                }
                track
            }
            Err(err) => {
                tracing::debug!(identifier = %identifier, error = %err, "resolve failed");
                None
            }
        }
    }

    /// Append one track and remember which file it came from.
    fn append(&self, track: &TrackHandle, path: &Path) -> bool {
        if let Err(err) = self.queue.add(track.clone()) {
            tracing::debug!(path = %path.display(), error = %err, "queue append failed");
            return false;
        }
        self.local_paths.record(track, path);
        true
    }

    async fn start(&self, first: Option<&TrackHandle>) {
        let Some(first) = first else {
            return;
        };
        if let Err(err) = self.queue.ensure_playing(first).await {
            tracing::warn!(error = %err, "ensure playing failed");
        }
    }
}

/// Resolve `paths` with at most `max_concurrency` requests in flight, then
/// append the successes in input order.
///
/// Failures (transport errors, empty results, rejected appends) are counted
/// and skipped; they never abort the other items.
pub async fn enqueue_paths(
    target: &EnqueueTarget<'_>,
    paths: &[PathBuf],
    max_concurrency: usize,
    progress: &dyn ProgressObserver,
) -> EnqueueSummary {
    let total = paths.len();
    if total == 0 {
        return EnqueueSummary::default();
    }

    let gate = Semaphore::new(max_concurrency.max(1));
    let mut pending: FuturesUnordered<_> = paths
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let gate = &gate;
            async move {
                let track = match gate.acquire().await {
                    Ok(_permit) => target.resolve_path(path).await,
                    Err(_) => None,
                };
                (index, track)
            }
        })
        .collect();

    let mut resolved: Vec<(usize, TrackHandle)> = Vec::with_capacity(total);
    let mut failed = 0usize;
    let mut done = 0usize;
    while let Some((index, track)) = pending.next().await {
        done += 1;
        match track {
            Some(track) => resolved.push((index, track)),
            None => failed += 1,
        }
        progress.on_progress(done, total);
    }

    resolved.sort_by_key(|(index, _)| *index);

    let mut added = 0usize;
    let mut first: Option<TrackHandle> = None;
    for (index, track) in resolved {
        if !target.append(&track, &paths[index]) {
            failed += 1;
            continue;
        }
        if first.is_none() {
            first = Some(track);
        }
        added += 1;
    }

    target.start(first.as_ref()).await;
    tracing::debug!(total, added, failed, "enqueue batch complete");
    EnqueueSummary { added, failed }
}

/// Options for [`warmup_then_enqueue`].
#[derive(Clone, Copy, Debug)]
pub struct WarmupOptions {
    /// Items resolved one by one before the concurrent phase.
    pub warmup_first: usize,
    pub max_concurrency: usize,
    pub shuffle: bool,
}

/// Keep only paths that canonicalize to somewhere under `base`.
pub fn authorized_paths(paths: Vec<PathBuf>, base: &Path) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter_map(|path| match path.canonicalize() {
            Ok(canon) if canon.starts_with(base) => Some(canon),
            _ => {
                tracing::debug!(path = %path.display(), "skipping path outside music directory");
                None
            }
        })
        .collect()
}

/// Queue a large batch so playback starts quickly.
///
/// The first `warmup_first` paths are resolved and appended one at a time
/// and playback is started; the rest go through [`enqueue_paths`]. Both
/// phases report on one shared `done` counter.
pub async fn warmup_then_enqueue(
    target: &EnqueueTarget<'_>,
    base: &Path,
    paths: Vec<PathBuf>,
    options: WarmupOptions,
    progress: &dyn ProgressObserver,
) -> Result<EnqueueSummary, EnqueueError> {
    if paths.is_empty() {
        return Err(EnqueueError::EmptyRequest);
    }
    let mut paths = authorized_paths(paths, base);
    if paths.is_empty() {
        return Err(EnqueueError::NothingAuthorized);
    }
    if options.shuffle {
        paths.shuffle(&mut rand::rng());
    }

    let total = paths.len();
    let split = options.warmup_first.min(total);
    let (warm, rest) = paths.split_at(split);

    let mut warm_summary = EnqueueSummary::default();
    let mut first: Option<TrackHandle> = None;
    for (done, path) in warm.iter().enumerate() {
        match target.resolve_path(path).await {
            Some(track) if target.append(&track, path) => {
                warm_summary.added += 1;
                if first.is_none() {
                    first = Some(track);
                }
            }
            _ => warm_summary.failed += 1,
        }
        progress.on_progress(done + 1, total);
    }
    target.start(first.as_ref()).await;

    let offset = OffsetProgress {
        inner: progress,
        offset: warm.len(),
        total,
    };
    let bulk = enqueue_paths(target, rest, options.max_concurrency, &offset).await;
    Ok(warm_summary.merge(bulk))
}

/// Emit the final progress line, then reject a batch where nothing was
/// queued.
pub fn finish_batch(
    progress: &ThrottledProgress,
    summary: EnqueueSummary,
) -> Result<EnqueueSummary, EnqueueError> {
    progress.finish(summary);
    if summary.added == 0 {
        return Err(EnqueueError::NothingQueued);
    }
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use music_hub_types::{LoadResult, LoadType};

    use super::*;

    /// Resolver whose latency and outcome are scripted per identifier.
    #[derive(Default)]
    pub(crate) struct ScriptedResolver {
        delays: HashMap<String, Duration>,
        failures: Vec<String>,
        empties: Vec<String>,
        in_flight: AtomicUsize,
        pub(crate) max_in_flight: AtomicUsize,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl ScriptedResolver {
        pub(crate) fn with_delay(mut self, id: &str, delay: Duration) -> Self {
            self.delays.insert(id.to_string(), delay);
            self
        }

        pub(crate) fn failing(mut self, id: &str) -> Self {
            self.failures.push(id.to_string());
            self
        }

        pub(crate) fn empty(mut self, id: &str) -> Self {
            self.empties.push(id.to_string());
            self
        }
    }

    #[async_trait]
    impl TrackResolver for ScriptedResolver {
        async fn load(&self, identifier: &str) -> Result<LoadResult, ResolveError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(identifier.to_string());
            if let Some(delay) = self.delays.get(identifier) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failures.iter().any(|f| f == identifier) {
                return Err(ResolveError::Transport("scripted failure".to_string()));
            }
            if self.empties.iter().any(|f| f == identifier) {
                return Ok(LoadResult::empty());
            }
            Ok(LoadResult {
                load_type: LoadType::Track,
                tracks: vec![TrackHandle {
                    encoded: format!("enc:{identifier}"),
                    identifier: identifier.to_string(),
                    uri: Some(format!("file://{identifier}")),
                    title: identifier.to_string(),
                    ..TrackHandle::default()
                }],
                playlist_name: None,
            })
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingQueue {
        pub(crate) items: Mutex<Vec<TrackHandle>>,
        pub(crate) started: Mutex<Vec<String>>,
        reject: Vec<String>,
    }

    #[async_trait]
    impl PlaybackQueue for RecordingQueue {
        fn add(&self, track: TrackHandle) -> Result<(), SessionError> {
            if self.reject.contains(&track.identifier) {
                return Err(SessionError::NotConnected("test".to_string()));
            }
            self.items.lock().unwrap().push(track);
            Ok(())
        }

        async fn ensure_playing(&self, first: &TrackHandle) -> Result<(), SessionError> {
            self.started.lock().unwrap().push(first.identifier.clone());
            Ok(())
        }
    }

    struct NoProgress;

    impl ProgressObserver for NoProgress {
        fn on_progress(&self, _done: usize, _total: usize) {}
    }

    #[derive(Default)]
    struct RecordingProgress {
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl ProgressObserver for RecordingProgress {
        fn on_progress(&self, done: usize, total: usize) {
            self.calls.lock().unwrap().push((done, total));
        }
    }

    fn ids(queue: &RecordingQueue) -> Vec<String> {
        queue
            .items
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.identifier.clone())
            .collect()
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/music/{n}"))).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn appends_in_input_order_despite_inverse_latency() {
        let input = paths(&["0.mp3", "1.mp3", "2.mp3", "3.mp3", "4.mp3"]);
        let mut resolver = ScriptedResolver::default();
        for (i, path) in input.iter().enumerate() {
            let delay = Duration::from_millis(((input.len() - i) * 100) as u64);
            resolver = resolver.with_delay(&path.to_string_lossy(), delay);
        }
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let progress = RecordingProgress::default();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let started_at = tokio::time::Instant::now();
        let summary = enqueue_paths(&target, &input, 2, &progress).await;
        let elapsed = started_at.elapsed();

        assert_eq!(summary, EnqueueSummary { added: 5, failed: 0 });
        let expected: Vec<String> = input.iter().map(|p| p.to_string_lossy().to_string()).collect();
        assert_eq!(ids(&queue), expected);
        assert_eq!(resolver.max_in_flight.load(Ordering::SeqCst), 2);
        // 1500ms one at a time; two lanes finish in 800ms.
        assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
        assert_eq!(
            *progress.calls.lock().unwrap(),
            vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
        );
        assert_eq!(*queue.started.lock().unwrap(), vec![expected[0].clone()]);
        assert_eq!(local_paths.get("enc:/music/0.mp3"), None);
        assert_eq!(local_paths.get("/music/3.mp3"), Some(PathBuf::from("/music/3.mp3")));
    }

    #[tokio::test(start_paused = true)]
    async fn limit_of_one_resolves_sequentially() {
        let input = paths(&["a.mp3", "b.mp3", "c.mp3"]);
        let mut resolver = ScriptedResolver::default();
        for path in &input {
            resolver = resolver.with_delay(&path.to_string_lossy(), Duration::from_millis(100));
        }
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let started_at = tokio::time::Instant::now();
        enqueue_paths(&target, &input, 1, &NoProgress).await;

        assert_eq!(resolver.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(started_at.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_and_survivors_keep_order() {
        let input = paths(&["a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3"]);
        let resolver = ScriptedResolver::default()
            .failing("/music/b.mp3")
            .empty("/music/d.mp3")
            .with_delay("/music/a.mp3", Duration::from_millis(300));
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let summary = enqueue_paths(&target, &input, 3, &NoProgress).await;

        assert_eq!(summary, EnqueueSummary { added: 3, failed: 2 });
        assert_eq!(ids(&queue), vec!["/music/a.mp3", "/music/c.mp3", "/music/e.mp3"]);
    }

    #[tokio::test]
    async fn rejected_appends_count_as_failures() {
        let input = paths(&["a.mp3", "b.mp3"]);
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue {
            reject: vec!["/music/a.mp3".to_string()],
            ..RecordingQueue::default()
        };
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let summary = enqueue_paths(&target, &input, 4, &NoProgress).await;

        assert_eq!(summary, EnqueueSummary { added: 1, failed: 1 });
        assert_eq!(*queue.started.lock().unwrap(), vec!["/music/b.mp3".to_string()]);
    }

    #[tokio::test]
    async fn total_failure_adds_nothing_and_does_not_start() {
        let input = paths(&["a.mp3"]);
        let resolver = ScriptedResolver::default().failing("/music/a.mp3");
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };

        let summary = enqueue_paths(&target, &input, 0, &NoProgress).await;

        assert_eq!(summary, EnqueueSummary { added: 0, failed: 1 });
        assert!(queue.started.lock().unwrap().is_empty());
    }

    fn library_dir(count: usize) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let files = (0..count)
            .map(|i| {
                let path = dir.path().join(format!("{i:02}.mp3"));
                std::fs::write(&path, b"stub").unwrap();
                path.canonicalize().unwrap()
            })
            .collect();
        (dir, files)
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_shares_one_progress_counter() {
        let (dir, files) = library_dir(6);
        let base = dir.path().canonicalize().unwrap();
        let resolver = Arc::new(
            ScriptedResolver::default()
                .with_delay(&files[3].to_string_lossy(), Duration::from_millis(500)),
        );
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let progress = RecordingProgress::default();
        let target = EnqueueTarget {
            resolver: &*resolver,
            queue: &queue,
            local_paths: &local_paths,
        };
        let options = WarmupOptions {
            warmup_first: 2,
            max_concurrency: 2,
            shuffle: false,
        };

        let summary = warmup_then_enqueue(&target, &base, files.clone(), options, &progress)
            .await
            .unwrap();

        assert_eq!(summary, EnqueueSummary { added: 6, failed: 0 });
        let done: Vec<usize> = progress.calls.lock().unwrap().iter().map(|c| c.0).collect();
        assert_eq!(done, vec![1, 2, 3, 4, 5, 6]);
        assert!(progress.calls.lock().unwrap().iter().all(|c| c.1 == 6));
        let expected: Vec<String> = files.iter().map(|p| p.to_string_lossy().to_string()).collect();
        assert_eq!(ids(&queue), expected);
        let started = queue.started.lock().unwrap().clone();
        assert_eq!(started[0], expected[0]);
    }

    #[tokio::test]
    async fn warmup_rejects_paths_outside_base() {
        let (dir, _files) = library_dir(1);
        let (_other_dir, outside) = library_dir(2);
        let resolver = ScriptedResolver::default();
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };
        let options = WarmupOptions {
            warmup_first: 8,
            max_concurrency: 6,
            shuffle: true,
        };

        let err = warmup_then_enqueue(
            &target,
            &dir.path().canonicalize().unwrap(),
            outside,
            options,
            &NoProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EnqueueError::NothingAuthorized));
        assert!(resolver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn warmup_smaller_than_batch_skips_bulk_phase() {
        let (dir, files) = library_dir(3);
        let resolver = ScriptedResolver::default().failing(&files[1].to_string_lossy());
        let queue = RecordingQueue::default();
        let local_paths = LocalPathMap::new();
        let target = EnqueueTarget {
            resolver: &resolver,
            queue: &queue,
            local_paths: &local_paths,
        };
        let options = WarmupOptions {
            warmup_first: 10,
            max_concurrency: 6,
            shuffle: false,
        };

        let summary = warmup_then_enqueue(
            &target,
            &dir.path().canonicalize().unwrap(),
            files,
            options,
            &NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(summary, EnqueueSummary { added: 2, failed: 1 });
        assert_eq!(queue.started.lock().unwrap().len(), 1);
    }

    #[test]
    fn throttled_progress_respects_step() {
        let progress = ThrottledProgress::new("g1", 2, Duration::ZERO);
        for done in 1..=5 {
            progress.on_progress(done, 5);
        }
        assert_eq!(progress.emitted(), 2);
        assert_eq!(progress.last_done(), 5);
    }

    #[test]
    fn all_failed_batch_still_finishes_progress() {
        let progress = ThrottledProgress::new("g1", 200, Duration::ZERO);
        progress.on_progress(3, 3);

        let err = finish_batch(&progress, EnqueueSummary { added: 0, failed: 3 }).unwrap_err();
        assert!(matches!(err, EnqueueError::NothingQueued));
        assert!(progress.finished());

        let ok = ThrottledProgress::new("g2", 200, Duration::ZERO);
        let summary = EnqueueSummary { added: 2, failed: 1 };
        assert_eq!(finish_batch(&ok, summary).unwrap(), summary);
        assert!(ok.finished());
    }

    #[test]
    fn throttled_progress_respects_interval() {
        let progress = ThrottledProgress::new("g1", 1, Duration::from_secs(3600));
        for done in 1..=5 {
            progress.on_progress(done, 5);
        }
        assert_eq!(progress.emitted(), 1);
    }
}
