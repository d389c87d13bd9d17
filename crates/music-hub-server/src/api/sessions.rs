//! Session API handlers: lifecycle, enqueue, play and queue control.

use actix_web::{HttpResponse, Responder, delete, get, post, web};

use crate::announce::{announce_now_playing, announce_queue_end};
use crate::api::library::select_tracks;
use crate::enqueue::{
    EnqueueError, EnqueueTarget, ThrottledProgress, WarmupOptions, finish_batch,
    warmup_then_enqueue,
};
use crate::idle_monitor::MonitoredSession;
use crate::models::{
    ClearRequest, ClearResponse, EnqueueRequest, EnqueueResponse, PlayRequest, PlayResponse,
    QueueResponse, SessionCreateRequest, SessionSummary, SessionsListResponse, SkipRequest,
    SkipResponse, SkipToRequest, StopResponse,
};
use crate::play::resolve_input;
use crate::session_registry::{PlayerSession, SessionError};
use crate::state::AppState;

/// Refuse work for sessions that are not connected, before anything is
/// sent to the resolver.
fn require_connected(session: &PlayerSession) -> Result<(), HttpResponse> {
    if session.activity().connected {
        Ok(())
    } else {
        Err(SessionError::NotConnected(session.id().to_string()).into_response())
    }
}

/// Announce whatever the session is playing now, if anything.
async fn announce_current(state: &AppState, session: &PlayerSession) {
    if let Some(track) = session.snapshot().current {
        announce_now_playing(
            state.announcer.as_ref(),
            session,
            &track,
            &state.local_paths,
            state.announce_dedup,
        )
        .await;
    }
}

#[utoipa::path(
    post,
    path = "/sessions",
    request_body = SessionCreateRequest,
    responses(
        (status = 200, description = "Session created or refreshed", body = SessionSummary),
        (status = 400, description = "Invalid request")
    )
)]
#[post("/sessions")]
/// Create (or reconnect) a session and set its announcement target.
pub async fn sessions_create(
    state: web::Data<AppState>,
    body: web::Json<SessionCreateRequest>,
) -> impl Responder {
    let req = body.into_inner();
    let id = req.id.trim();
    if id.is_empty() {
        return HttpResponse::BadRequest().body("id is required");
    }
    let target = req
        .announce_target
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let session = state.sessions.create_or_get(id, target);
    session.connect();
    HttpResponse::Ok().json(SessionSummary::from(session.snapshot()))
}

#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Known sessions", body = SessionsListResponse)
    )
)]
#[get("/sessions")]
pub async fn sessions_list(state: web::Data<AppState>) -> impl Responder {
    let sessions = state
        .sessions
        .list()
        .into_iter()
        .map(|s| SessionSummary::from(s.snapshot()))
        .collect();
    HttpResponse::Ok().json(SessionsListResponse { sessions })
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Session disconnected and removed"),
        (status = 404, description = "Unknown session")
    )
)]
#[delete("/sessions/{id}")]
/// Disconnect a session and forget it.
pub async fn sessions_delete(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    let Some(session) = state.sessions.remove(&id) else {
        return HttpResponse::NotFound().body(format!("unknown session {id}"));
    };
    if let Err(err) = session.disconnect().await {
        tracing::debug!(session_id = %id, error = %err, "session was already disconnected");
    }
    HttpResponse::Ok().finish()
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/enqueue",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Tracks queued", body = EnqueueResponse),
        (status = 400, description = "Invalid filter"),
        (status = 404, description = "Unknown session, artist or album"),
        (status = 409, description = "Session not connected"),
        (status = 422, description = "Nothing could be queued"),
        (status = 503, description = "No resolver configured")
    )
)]
#[post("/sessions/{id}/enqueue")]
/// Queue library tracks with the warm-up protocol.
pub async fn session_enqueue(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<EnqueueRequest>,
) -> impl Responder {
    let id = path.into_inner();
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(resp) = require_connected(&session) {
        return resp;
    }
    let Some(resolver) = state.resolver.clone() else {
        return EnqueueError::NotConfigured.into_response();
    };
    let req = body.into_inner();
    let paths = match select_tracks(&state, req.artist.as_deref(), req.album.as_deref()) {
        Ok(paths) if paths.is_empty() => return HttpResponse::NotFound().body("no tracks found"),
        Ok(paths) => paths,
        Err(resp) => return resp,
    };
    let requested = paths.len();

    let settings = &state.enqueue;
    let progress = ThrottledProgress::new(
        id.as_str(),
        settings.progress_every,
        settings.progress_min_interval,
    );
    let options = WarmupOptions {
        warmup_first: settings.warmup_first,
        max_concurrency: settings.max_concurrency,
        shuffle: req.shuffle,
    };
    let target = EnqueueTarget {
        resolver: resolver.as_ref(),
        queue: &*session,
        local_paths: &state.local_paths,
    };
    tracing::info!(session_id = %id, requested, shuffle = req.shuffle, "enqueue requested");

    let base = state.library().base();
    let result = warmup_then_enqueue(&target, &base, paths, options, &progress)
        .await
        .and_then(|summary| finish_batch(&progress, summary));
    match result {
        Ok(summary) => {
            announce_current(&state, &session).await;
            HttpResponse::Ok().json(EnqueueResponse {
                requested,
                added: summary.added,
                failed: summary.failed,
            })
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/play",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    request_body = PlayRequest,
    responses(
        (status = 200, description = "Track(s) queued", body = PlayResponse),
        (status = 403, description = "File outside the music directory"),
        (status = 404, description = "Unknown session, missing file or no results"),
        (status = 409, description = "Session not connected"),
        (status = 502, description = "Resolver failed"),
        (status = 503, description = "No resolver configured")
    )
)]
#[post("/sessions/{id}/play")]
/// Queue one local file, URL or search result.
pub async fn session_play(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PlayRequest>,
) -> impl Responder {
    let id = path.into_inner();
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    if let Err(resp) = require_connected(&session) {
        return resp;
    }
    let Some(resolver) = state.resolver.clone() else {
        return EnqueueError::NotConfigured.into_response();
    };
    let target = EnqueueTarget {
        resolver: resolver.as_ref(),
        queue: &*session,
        local_paths: &state.local_paths,
    };
    let base = state.library().base();
    let result = resolve_input(
        &target,
        &base,
        &body.query,
        &state.enqueue.search_prefix,
    )
    .await;
    match result {
        Ok(outcome) => {
            announce_current(&state, &session).await;
            HttpResponse::Ok().json(PlayResponse {
                added: outcome.added,
                playlist_name: outcome.playlist_name,
            })
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/queue",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Current track and queue", body = QueueResponse),
        (status = 404, description = "Unknown session")
    )
)]
#[get("/sessions/{id}/queue")]
pub async fn session_queue(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.sessions.get(&path.into_inner()) {
        Ok(session) => {
            let snapshot = session.snapshot();
            HttpResponse::Ok().json(QueueResponse {
                current: snapshot.current,
                items: snapshot.queue,
            })
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/skip",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    request_body = SkipRequest,
    responses(
        (status = 200, description = "Tracks skipped", body = SkipResponse),
        (status = 404, description = "Unknown session")
    )
)]
#[post("/sessions/{id}/skip")]
pub async fn session_skip(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<SkipRequest>>,
) -> impl Responder {
    let session = match state.sessions.get(&path.into_inner()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let count = body.and_then(|b| b.count).unwrap_or(1).max(1);
    let skipped = session.skip(count);
    announce_current(&state, &session).await;
    HttpResponse::Ok().json(SkipResponse {
        skipped,
        now_playing: session.snapshot().current,
    })
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/clear",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    request_body = ClearRequest,
    responses(
        (status = 200, description = "Queue cleared", body = ClearResponse),
        (status = 404, description = "Unknown session")
    )
)]
#[post("/sessions/{id}/clear")]
pub async fn session_clear(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: Option<web::Json<ClearRequest>>,
) -> impl Responder {
    let session = match state.sessions.get(&path.into_inner()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let stop = body.map(|b| b.stop).unwrap_or(false);
    HttpResponse::Ok().json(ClearResponse {
        removed: session.clear(stop),
    })
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/track-end",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Advanced to the next queued track", body = SkipResponse),
        (status = 404, description = "Unknown session")
    )
)]
#[post("/sessions/{id}/track-end")]
/// Player event: the current track finished. Starts and announces the next one.
pub async fn session_track_end(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let session = match state.sessions.get(&path.into_inner()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let had_current = session.snapshot().current.is_some();
    let now_playing = session.finish_current();
    if now_playing.is_some() {
        announce_current(&state, &session).await;
    } else if had_current {
        announce_queue_end(state.announcer.as_ref(), &session).await;
    }
    HttpResponse::Ok().json(SkipResponse {
        skipped: usize::from(had_current),
        now_playing,
    })
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/skipto",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    request_body = SkipToRequest,
    responses(
        (status = 200, description = "Jumped to the queue position", body = SkipResponse),
        (status = 404, description = "Unknown session or empty queue")
    )
)]
#[post("/sessions/{id}/skipto")]
/// Jump to queue position `index` (1 = the next track).
pub async fn session_skip_to(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<SkipToRequest>,
) -> impl Responder {
    let session = match state.sessions.get(&path.into_inner()) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let snapshot = session.snapshot();
    if snapshot.current.is_none() && snapshot.queue.is_empty() {
        return HttpResponse::NotFound().body("queue is empty");
    }
    let skipped = session.skip_to(body.index);
    announce_current(&state, &session).await;
    HttpResponse::Ok().json(SkipResponse {
        skipped,
        now_playing: session.snapshot().current,
    })
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/stop",
    params(
        ("id" = String, Path, description = "Session id")
    ),
    responses(
        (status = 200, description = "Playback stopped, queue cleared, session disconnected", body = StopResponse),
        (status = 404, description = "Unknown session")
    )
)]
#[post("/sessions/{id}/stop")]
/// Stop, clear the queue and disconnect; the session stays registered.
pub async fn session_stop(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();
    let session = match state.sessions.get(&id) {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    let removed = session.clear(true);
    if let Err(err) = session.disconnect().await {
        tracing::debug!(session_id = %id, error = %err, "session was already disconnected");
    }
    HttpResponse::Ok().json(StopResponse { removed })
}
