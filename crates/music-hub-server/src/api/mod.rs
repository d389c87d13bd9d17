//! HTTP API handlers.
//!
//! Defines the Actix routes for the library, sessions and their queues.

pub mod health;
pub mod library;
pub mod sessions;

use actix_web::HttpResponse;

pub use self::health::health as health_route;
pub use self::library::{
    library_albums, library_artists, library_reindex, library_scan, library_set_base,
    library_tracks,
};
pub use self::sessions::{
    session_clear, session_enqueue, session_play, session_queue, session_skip, session_skip_to,
    session_stop, session_track_end, sessions_create, sessions_delete, sessions_list,
};

use crate::enqueue::EnqueueError;
use crate::session_registry::SessionError;

impl SessionError {
    pub fn into_response(self) -> HttpResponse {
        match self {
            SessionError::Unknown(_) => HttpResponse::NotFound().body(self.to_string()),
            SessionError::NotConnected(_) => HttpResponse::Conflict().body(self.to_string()),
        }
    }
}

impl EnqueueError {
    pub fn into_response(self) -> HttpResponse {
        match self {
            EnqueueError::NotConfigured => {
                HttpResponse::ServiceUnavailable().body(self.to_string())
            }
            EnqueueError::EmptyRequest => HttpResponse::BadRequest().body(self.to_string()),
            EnqueueError::OutsideBase(_) | EnqueueError::NothingAuthorized => {
                HttpResponse::Forbidden().body(self.to_string())
            }
            EnqueueError::NothingQueued => {
                HttpResponse::UnprocessableEntity().body(self.to_string())
            }
            EnqueueError::MissingFile(_) | EnqueueError::NoResults => {
                HttpResponse::NotFound().body(self.to_string())
            }
            EnqueueError::Resolve(err) => {
                tracing::warn!(error = %err, "resolver request failed");
                HttpResponse::BadGateway().body(err.to_string())
            }
            EnqueueError::Session(err) => err.into_response(),
        }
    }
}
