//! Shared application state.
//!
//! Holds the library, the session registry and the collaborators the
//! handlers pass into the enqueue pipeline.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::announce::Announcer;
use crate::config::EnqueueSettings;
use crate::library::Library;
use crate::local_paths::LocalPathMap;
use crate::resolver::TrackResolver;
use crate::session_registry::SessionRegistry;

pub struct AppState {
    library: RwLock<Arc<Library>>,
    pub sessions: SessionRegistry,
    /// `None` when no resolver node is configured.
    pub resolver: Option<Arc<dyn TrackResolver>>,
    pub local_paths: LocalPathMap,
    pub announcer: Arc<dyn Announcer>,
    pub enqueue: EnqueueSettings,
    pub announce_dedup: Duration,
}

impl AppState {
    pub fn new(
        library: Arc<Library>,
        sessions: SessionRegistry,
        resolver: Option<Arc<dyn TrackResolver>>,
        announcer: Arc<dyn Announcer>,
        enqueue: EnqueueSettings,
        announce_dedup: Duration,
    ) -> Self {
        Self {
            library: RwLock::new(library),
            sessions,
            resolver,
            local_paths: LocalPathMap::new(),
            announcer,
            enqueue,
            announce_dedup,
        }
    }

    /// Library currently serving requests.
    pub fn library(&self) -> Arc<Library> {
        self.library
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Replace the library; requests already holding the old one finish on it.
    pub fn set_library(&self, library: Arc<Library>) {
        *self.library.write().unwrap_or_else(|err| err.into_inner()) = library;
    }
}
