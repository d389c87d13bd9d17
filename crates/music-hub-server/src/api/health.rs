use actix_web::{HttpResponse, Responder, get, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_sha: String,
    pub build_date: String,
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub sessions: usize,
}

/// Basic health check with build info and library counts.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Hub server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    let summary = state.library().summary();
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_sha: env!("MUSIC_HUB_GIT_SHA").to_string(),
        build_date: env!("MUSIC_HUB_BUILD_DATE").to_string(),
        artists: summary.artists,
        albums: summary.albums,
        tracks: summary.tracks,
        sessions: state.sessions.list().len(),
    })
}
