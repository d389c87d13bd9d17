//! Library API handlers.

use std::path::Path;
use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, web};
use music_hub_types::ScanStats;

use crate::models::{
    AlbumsQuery, AlbumsResponse, ArtistsResponse, LibraryBaseRequest, LibraryBaseResponse,
    TracksQuery, TracksResponse,
};
use crate::resolver::strip_wrapping;
use crate::state::AppState;

async fn run_scan(state: &web::Data<AppState>, force_full: bool) -> HttpResponse {
    let library = state.library();
    tracing::info!(root = %library.base().display(), force_full, "scan requested");
    match web::block(move || library.scan(force_full)).await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(err) => HttpResponse::InternalServerError().body(format!("scan failed: {err}")),
    }
}

#[utoipa::path(
    post,
    path = "/library/scan",
    responses(
        (status = 200, description = "Incremental scan finished", body = ScanStats),
        (status = 500, description = "Scan failed")
    )
)]
#[post("/library/scan")]
/// Rescan the library, reusing cached tags for unchanged files.
pub async fn library_scan(state: web::Data<AppState>) -> impl Responder {
    run_scan(&state, false).await
}

#[utoipa::path(
    post,
    path = "/library/reindex",
    responses(
        (status = 200, description = "Full reindex finished", body = ScanStats),
        (status = 500, description = "Scan failed")
    )
)]
#[post("/library/reindex")]
/// Rebuild the library from scratch, ignoring the cache.
pub async fn library_reindex(state: web::Data<AppState>) -> impl Responder {
    run_scan(&state, true).await
}

#[utoipa::path(
    post,
    path = "/library/base",
    request_body = LibraryBaseRequest,
    responses(
        (status = 200, description = "Media root switched and scanned", body = LibraryBaseResponse),
        (status = 400, description = "Not an existing directory"),
        (status = 500, description = "Scan failed")
    )
)]
#[post("/library/base")]
/// Switch the media root at runtime and scan the new one.
pub async fn library_set_base(
    state: web::Data<AppState>,
    body: web::Json<LibraryBaseRequest>,
) -> impl Responder {
    let requested = Path::new(strip_wrapping(body.path.trim())).to_path_buf();
    let base = match requested.canonicalize() {
        Ok(base) if base.is_dir() => base,
        _ => {
            return HttpResponse::BadRequest()
                .body(format!("not a directory: {}", requested.display()));
        }
    };
    let library = Arc::new(state.library().rebased(&base));
    let scanning = library.clone();
    let stats = match web::block(move || scanning.scan(false)).await {
        Ok(stats) => stats,
        Err(err) => {
            return HttpResponse::InternalServerError().body(format!("scan failed: {err}"));
        }
    };
    state.set_library(library);
    tracing::info!(root = %base.display(), tracks = stats.total, "media root switched");
    HttpResponse::Ok().json(LibraryBaseResponse {
        base: base.to_string_lossy().to_string(),
        stats,
    })
}

#[utoipa::path(
    get,
    path = "/library/artists",
    responses(
        (status = 200, description = "Artist names", body = ArtistsResponse)
    )
)]
#[get("/library/artists")]
pub async fn library_artists(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(ArtistsResponse {
        artists: state.library().artists(),
    })
}

#[utoipa::path(
    get,
    path = "/library/albums",
    params(AlbumsQuery),
    responses(
        (status = 200, description = "Albums of one artist", body = AlbumsResponse),
        (status = 404, description = "Unknown artist")
    )
)]
#[get("/library/albums")]
pub async fn library_albums(
    state: web::Data<AppState>,
    query: web::Query<AlbumsQuery>,
) -> impl Responder {
    let library = state.library();
    let Some(artist) = library.find_artist(&query.artist) else {
        return HttpResponse::NotFound().body(format!("artist not found: {}", query.artist));
    };
    let albums = library.albums(&artist);
    HttpResponse::Ok().json(AlbumsResponse { artist, albums })
}

/// Resolve a track filter to paths; `Err` carries the response to send.
pub(crate) fn select_tracks(
    state: &AppState,
    artist: Option<&str>,
    album: Option<&str>,
) -> Result<Vec<std::path::PathBuf>, HttpResponse> {
    let library = state.library();
    match (artist, album) {
        (None, None) => Ok(library.all_tracks()),
        (None, Some(_)) => Err(HttpResponse::BadRequest().body("album requires artist")),
        (Some(artist_query), album) => {
            let artist = library.find_artist(artist_query).ok_or_else(|| {
                HttpResponse::NotFound().body(format!("artist not found: {artist_query}"))
            })?;
            match album {
                None => Ok(library.tracks_by_artist(&artist)),
                Some(album_query) => {
                    let album = library.find_album(&artist, album_query).ok_or_else(|| {
                        HttpResponse::NotFound().body(format!("album not found: {album_query}"))
                    })?;
                    Ok(library.tracks_by_album(&artist, &album))
                }
            }
        }
    }
}

#[utoipa::path(
    get,
    path = "/library/tracks",
    params(TracksQuery),
    responses(
        (status = 200, description = "Track paths", body = TracksResponse),
        (status = 400, description = "Album given without artist"),
        (status = 404, description = "Unknown artist or album")
    )
)]
#[get("/library/tracks")]
pub async fn library_tracks(
    state: web::Data<AppState>,
    query: web::Query<TracksQuery>,
) -> impl Responder {
    match select_tracks(&state, query.artist.as_deref(), query.album.as_deref()) {
        Ok(paths) => HttpResponse::Ok().json(TracksResponse {
            tracks: paths
                .iter()
                .map(|p| p.to_string_lossy().to_string())
                .collect(),
        }),
        Err(resp) => resp,
    }
}
