//! Persisted scan cache.
//!
//! Keeps per-file tags keyed by absolute path together with the size/mtime
//! fingerprint they were read at, so repeated scans only re-read changed files.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tags::TrackTags;

/// Cache schema version; blobs with any other version are ignored.
pub const CACHE_VERSION: u32 = 1;
/// Cache file name placed inside the media root.
pub const CACHE_FILE_NAME: &str = ".music_hub_cache.json";

/// Cached metadata for one audio file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackRecord {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub trackno: Option<u32>,
    pub size: u64,
    pub mtime: i64,
}

impl TrackRecord {
    pub fn new(tags: TrackTags, fingerprint: Fingerprint) -> Self {
        Self {
            artist: tags.artist,
            album: tags.album,
            title: tags.title,
            trackno: tags.track_number,
            size: fingerprint.size,
            mtime: fingerprint.mtime,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            size: self.size,
            mtime: self.mtime,
        }
    }
}

/// Size plus whole-second modification time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime: i64,
}

impl Fingerprint {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = fs::metadata(path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(Self {
            size: meta.len(),
            mtime,
        })
    }
}

/// On-disk cache document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheBlob {
    pub version: u32,
    pub base: String,
    pub saved_at: i64,
    pub files: HashMap<String, TrackRecord>,
}

/// Reader/writer for the cache file of one media root.
#[derive(Clone, Debug)]
pub struct LibraryCache {
    base: PathBuf,
    path: PathBuf,
}

impl LibraryCache {
    /// `base` must already be canonical; `path` defaults to `<base>/.music_hub_cache.json`.
    pub fn new(base: PathBuf, path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(|| base.join(CACHE_FILE_NAME));
        Self { base, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cache, or `None` when it is missing, unreadable or belongs to
    /// another schema version or media root.
    pub fn load(&self) -> Option<CacheBlob> {
        if !self.path.exists() {
            return None;
        }
        let blob = match self.read_blob() {
            Ok(blob) => blob,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "ignoring unreadable library cache");
                return None;
            }
        };
        if blob.version != CACHE_VERSION {
            tracing::info!(
                found = blob.version,
                expected = CACHE_VERSION,
                "library cache version mismatch; rescanning"
            );
            return None;
        }
        let same_base = Path::new(&blob.base)
            .canonicalize()
            .map(|base| base == self.base)
            .unwrap_or(false);
        if !same_base {
            tracing::info!(cached = %blob.base, base = %self.base.display(), "library cache base mismatch; rescanning");
            return None;
        }
        Some(blob)
    }

    fn read_blob(&self) -> Result<CacheBlob> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read cache {:?}", self.path))?;
        let blob = serde_json::from_str::<CacheBlob>(&raw)
            .with_context(|| format!("parse cache {:?}", self.path))?;
        Ok(blob)
    }

    /// Persist `files`; failures are logged and otherwise ignored.
    pub fn save(&self, files: &HashMap<String, TrackRecord>) {
        if let Err(err) = self.write_atomic(files) {
            tracing::warn!(path = %self.path.display(), error = %err, "library cache save failed");
        }
    }

    fn write_atomic(&self, files: &HashMap<String, TrackRecord>) -> Result<()> {
        let blob = CacheBlobRef {
            version: CACHE_VERSION,
            base: self.base.to_string_lossy().to_string(),
            saved_at: unix_now(),
            files,
        };
        let tmp = self.path.with_extension("tmp");
        {
            let mut file =
                fs::File::create(&tmp).with_context(|| format!("create {:?}", tmp))?;
            serde_json::to_writer(&mut file, &blob).context("serialize cache")?;
            file.flush().context("flush cache")?;
        }
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err).with_context(|| format!("rename {:?} -> {:?}", tmp, self.path));
        }
        Ok(())
    }
}

/// Borrowing twin of [`CacheBlob`] so saving does not clone the file map.
#[derive(Serialize)]
struct CacheBlobRef<'a> {
    version: u32,
    base: String,
    saved_at: i64,
    files: &'a HashMap<String, TrackRecord>,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
