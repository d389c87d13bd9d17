//! Library scanning and indexing.
//!
//! Walks the media root, reuses cached tags for unchanged files, reads tags
//! for new or changed files on a worker pool, and builds the
//! artist -> album -> tracks lookup.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use music_hub_types::ScanStats;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::library_cache::{Fingerprint, LibraryCache, TrackRecord};
use crate::tags::read_tags;

const EXCLUDED_DIR_NAMES: &[&str] = &[".git", "__pycache__", ".cache"];

fn is_supported_extension(ext: &str) -> bool {
    matches!(ext, "mp3" | "flac" | "wav" | "ogg" | "m4a" | "aac" | "opus")
}

/// One track slot inside an album.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedTrack {
    pub track_number: Option<u32>,
    pub path: PathBuf,
}

/// Immutable artist -> album -> tracks snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LibraryIndex {
    artists: HashMap<String, HashMap<String, Vec<IndexedTrack>>>,
}

impl LibraryIndex {
    /// Build the tree from cache records; each album is sorted by track
    /// number (missing numbers last) and then by file name.
    pub fn from_records(records: &HashMap<String, TrackRecord>) -> Self {
        let mut artists: HashMap<String, HashMap<String, Vec<IndexedTrack>>> = HashMap::new();
        for (path, record) in records {
            artists
                .entry(record.artist.clone())
                .or_default()
                .entry(record.album.clone())
                .or_default()
                .push(IndexedTrack {
                    track_number: record.trackno,
                    path: PathBuf::from(path),
                });
        }
        for albums in artists.values_mut() {
            for tracks in albums.values_mut() {
                tracks.sort_by(compare_tracks);
            }
        }
        Self { artists }
    }

    fn artist_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.artists.keys().cloned().collect();
        sort_case_insensitive(&mut names);
        names
    }

    fn album_names(&self, artist: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .artists
            .get(artist)
            .map(|albums| albums.keys().cloned().collect())
            .unwrap_or_default();
        sort_case_insensitive(&mut names);
        names
    }

    fn album_tracks(&self, artist: &str, album: &str) -> Vec<PathBuf> {
        self.artists
            .get(artist)
            .and_then(|albums| albums.get(album))
            .map(|tracks| tracks.iter().map(|t| t.path.clone()).collect())
            .unwrap_or_default()
    }

    fn artist_tracks(&self, artist: &str) -> Vec<PathBuf> {
        self.album_names(artist)
            .iter()
            .flat_map(|album| self.album_tracks(artist, album))
            .collect()
    }
}

fn compare_tracks(a: &IndexedTrack, b: &IndexedTrack) -> Ordering {
    let key = |t: &IndexedTrack| (t.track_number.is_none(), t.track_number);
    key(a)
        .cmp(&key(b))
        .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
}

fn sort_case_insensitive(names: &mut [String]) {
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Counts shown after a scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LibrarySummary {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

/// Scannable media library rooted at one directory.
///
/// Readers always see a complete index: a scan builds the replacement off to
/// the side and swaps it in at the end. Scans are serialized.
pub struct Library {
    /// Absolute root as configured; resolved again on every use so a root
    /// that appears after startup still canonicalizes.
    root: PathBuf,
    cache_file: Option<PathBuf>,
    index: RwLock<LibraryIndex>,
    last_stats: RwLock<ScanStats>,
    scan_lock: Mutex<()>,
}

impl Library {
    /// Create an empty library; call [`Library::scan`] to populate it.
    pub fn new(base: &Path, cache_file: Option<PathBuf>) -> Self {
        let root = std::path::absolute(base).unwrap_or_else(|_| base.to_path_buf());
        Self {
            root,
            cache_file,
            index: RwLock::new(LibraryIndex::default()),
            last_stats: RwLock::new(ScanStats::default()),
            scan_lock: Mutex::new(()),
        }
    }

    /// Same cache settings, different root.
    pub fn rebased(&self, base: &Path) -> Self {
        Self::new(base, self.cache_file.clone())
    }

    /// Canonical media root, or the absolute configured path while it does
    /// not exist.
    pub fn base(&self) -> PathBuf {
        self.root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone())
    }

    /// Rebuild the index, reusing cached tags unless `force_full` is set.
    pub fn scan(&self, force_full: bool) -> ScanStats {
        let _guard = self.scan_lock.lock().unwrap_or_else(|err| err.into_inner());

        let base = self.base();
        if !base.is_dir() {
            tracing::warn!(root = %base.display(), "library root missing; index cleared");
            self.publish(LibraryIndex::default(), ScanStats::default());
            return ScanStats::default();
        }

        let cache = LibraryCache::new(base.clone(), self.cache_file.clone());
        tracing::info!(
            root = %base.display(),
            cache = %cache.path().display(),
            force_full,
            "scanning library"
        );
        let current = enumerate_audio_files(&base);
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();

        let cached = if force_full {
            HashMap::new()
        } else {
            cache.load().map(|blob| blob.files).unwrap_or_default()
        };

        let mut kept: HashMap<String, TrackRecord> = HashMap::new();
        let mut to_process: Vec<String> = Vec::new();
        let mut removed = 0usize;
        for (path, record) in &cached {
            if !current_set.contains(path.as_str()) {
                removed += 1;
                continue;
            }
            match Fingerprint::from_path(Path::new(path)) {
                Ok(now) if now == record.fingerprint() => {
                    kept.insert(path.clone(), record.clone());
                }
                Ok(_) => to_process.push(path.clone()),
                Err(_) => removed += 1,
            }
        }
        let added: Vec<String> = current
            .iter()
            .filter(|path| !cached.contains_key(path.as_str()))
            .cloned()
            .collect();
        let added_count = added.len();
        to_process.extend(added);

        let processed = read_records(&to_process);
        let stats = tally(
            current.len(),
            &kept,
            &to_process,
            &processed,
            added_count,
            removed,
            &cached,
        );

        let mut merged = kept;
        merged.extend(processed);
        cache.save(&merged);

        self.publish(LibraryIndex::from_records(&merged), stats);
        tracing::info!(
            root = %base.display(),
            total = stats.total,
            cached = stats.cached,
            updated = stats.updated,
            added = stats.added,
            removed = stats.removed,
            "library scan complete"
        );
        stats
    }

    fn publish(&self, index: LibraryIndex, stats: ScanStats) {
        *self.index.write().unwrap_or_else(|err| err.into_inner()) = index;
        *self.last_stats.write().unwrap_or_else(|err| err.into_inner()) = stats;
    }

    fn with_index<T>(&self, f: impl FnOnce(&LibraryIndex) -> T) -> T {
        let index = self.index.read().unwrap_or_else(|err| err.into_inner());
        f(&index)
    }

    /// Stats of the most recent scan.
    pub fn last_stats(&self) -> ScanStats {
        *self.last_stats.read().unwrap_or_else(|err| err.into_inner())
    }

    /// Artist names sorted case-insensitively.
    pub fn artists(&self) -> Vec<String> {
        self.with_index(|index| index.artist_names())
    }

    /// Album names of `artist` sorted case-insensitively.
    pub fn albums(&self, artist: &str) -> Vec<String> {
        self.with_index(|index| index.album_names(artist))
    }

    pub fn all_tracks(&self) -> Vec<PathBuf> {
        self.with_index(|index| {
            index
                .artist_names()
                .iter()
                .flat_map(|artist| index.artist_tracks(artist))
                .collect()
        })
    }

    pub fn tracks_by_artist(&self, artist: &str) -> Vec<PathBuf> {
        self.with_index(|index| index.artist_tracks(artist))
    }

    pub fn tracks_by_album(&self, artist: &str, album: &str) -> Vec<PathBuf> {
        self.with_index(|index| index.album_tracks(artist, album))
    }

    /// Exact artist name, or the first one matching after trim + lowercase.
    pub fn find_artist(&self, name: &str) -> Option<String> {
        find_name(self.artists(), name)
    }

    /// Exact album name of `artist`, or the first loose match.
    pub fn find_album(&self, artist: &str, name: &str) -> Option<String> {
        find_name(self.albums(artist), name)
    }

    pub fn summary(&self) -> LibrarySummary {
        self.with_index(|index| LibrarySummary {
            artists: index.artists.len(),
            albums: index.artists.values().map(HashMap::len).sum(),
            tracks: index
                .artists
                .values()
                .flat_map(HashMap::values)
                .map(Vec::len)
                .sum(),
        })
    }
}

/// Files that vanished between enumeration and their tag read count as
/// removed rather than updated.
fn tally(
    total: usize,
    kept: &HashMap<String, TrackRecord>,
    to_process: &[String],
    processed: &[(String, TrackRecord)],
    added: usize,
    removed: usize,
    cached: &HashMap<String, TrackRecord>,
) -> ScanStats {
    let vanished = to_process.len().saturating_sub(processed.len());
    let vanished_new = to_process
        .iter()
        .filter(|path| !cached.contains_key(path.as_str()))
        .count()
        .saturating_sub(
            processed
                .iter()
                .filter(|(path, _)| !cached.contains_key(path.as_str()))
                .count(),
        );
    ScanStats {
        total: total.saturating_sub(vanished),
        cached: kept.len(),
        updated: processed.len(),
        added: added.saturating_sub(vanished_new),
        removed: removed + vanished - vanished_new,
    }
}

fn find_name(names: Vec<String>, wanted: &str) -> Option<String> {
    if names.iter().any(|n| n == wanted) {
        return Some(wanted.to_string());
    }
    let wanted = normalize(wanted);
    names.into_iter().find(|n| normalize(n) == wanted)
}

/// Canonical paths of every supported audio file under `root`.
fn enumerate_audio_files(root: &Path) -> Vec<String> {
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let mut files = Vec::new();
    for entry in walker
        .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e))
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("")
            .to_ascii_lowercase();
        if !is_supported_extension(&ext) {
            continue;
        }
        match path.canonicalize() {
            Ok(canon) => files.push(canon.to_string_lossy().to_string()),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "skipping unresolvable file");
            }
        }
    }
    files
}

fn is_excluded_dir(entry: &walkdir::DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_DIR_NAMES.contains(&name))
            .unwrap_or(false)
}

/// Read tags for `paths` on a pool sized to the available cores.
fn read_records(paths: &[String]) -> Vec<(String, TrackRecord)> {
    if paths.is_empty() {
        return Vec::new();
    }
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .max(1);
    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(|| paths.par_iter().filter_map(|p| read_record(p)).collect()),
        Err(err) => {
            tracing::warn!(error = %err, "tag worker pool unavailable; reading sequentially");
            paths.iter().filter_map(|p| read_record(p)).collect()
        }
    }
}

fn read_record(path: &str) -> Option<(String, TrackRecord)> {
    let file = Path::new(path);
    let tags = read_tags(file);
    match Fingerprint::from_path(file) {
        Ok(fingerprint) => Some((path.to_string(), TrackRecord::new(tags, fingerprint))),
        Err(err) => {
            tracing::debug!(path, error = %err, "file vanished during scan");
            None
        }
    }
}
