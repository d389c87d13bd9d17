use utoipa::OpenApi;

use crate::api;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health,
        api::library::library_scan,
        api::library::library_reindex,
        api::library::library_set_base,
        api::library::library_artists,
        api::library::library_albums,
        api::library::library_tracks,
        api::sessions::sessions_create,
        api::sessions::sessions_list,
        api::sessions::sessions_delete,
        api::sessions::session_enqueue,
        api::sessions::session_play,
        api::sessions::session_queue,
        api::sessions::session_skip,
        api::sessions::session_skip_to,
        api::sessions::session_clear,
        api::sessions::session_stop,
        api::sessions::session_track_end,
    ),
    components(
        schemas(
            api::health::HealthResponse,
            music_hub_types::ScanStats,
            music_hub_types::TrackHandle,
            music_hub_types::LoadType,
            models::ArtistsResponse,
            models::AlbumsResponse,
            models::TracksResponse,
            models::LibraryBaseRequest,
            models::LibraryBaseResponse,
            models::SessionCreateRequest,
            models::SessionSummary,
            models::SessionsListResponse,
            models::EnqueueRequest,
            models::EnqueueResponse,
            models::PlayRequest,
            models::PlayResponse,
            models::QueueResponse,
            models::SkipRequest,
            models::SkipToRequest,
            models::SkipResponse,
            models::StopResponse,
            models::ClearRequest,
            models::ClearResponse,
        )
    ),
    tags(
        (name = "music-hub-server", description = "Music library and playback queue API")
    )
)]
pub struct ApiDoc;
