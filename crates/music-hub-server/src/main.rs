mod announce;
mod api;
mod config;
mod enqueue;
mod idle_monitor;
mod library;
mod library_cache;
mod local_paths;
mod models;
mod openapi;
mod play;
mod resolver;
mod session_registry;
mod state;
mod tags;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::idle_monitor::IdleMonitor;
use crate::library::Library;
use crate::resolver::{LavalinkClient, TrackResolver};
use crate::session_registry::SessionRegistry;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "music-hub-server")]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:8080
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Media library root directory
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Optional server config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Explicit `--config`, else `config.toml` next to the executable, else defaults.
fn load_config(explicit: Option<&Path>) -> Result<config::ServerConfig> {
    if let Some(path) = explicit {
        return config::ServerConfig::load(path);
    }
    let auto_path = std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
    match auto_path {
        Some(path) if path.exists() => config::ServerConfig::load(&path),
        _ => {
            tracing::info!("no config file found; using defaults");
            Ok(config::ServerConfig::default())
        }
    }
}

fn build_resolver(cfg: &config::ServerConfig) -> Result<Option<Arc<dyn TrackResolver>>> {
    let Some(resolver) = cfg.resolver.as_ref() else {
        tracing::warn!("no [resolver] configured; enqueue and play are disabled");
        return Ok(None);
    };
    let client = LavalinkClient::new(&resolver.base_url, resolver.password.clone())
        .with_context(|| format!("create resolver client for {}", resolver.base_url))?;
    tracing::info!(base_url = %resolver.base_url, "resolver configured");
    Ok(Some(Arc::new(client)))
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,music_hub_server=info")
        }))
        .init();

    let cfg = load_config(args.config.as_deref())?;
    let bind = match args.bind {
        Some(addr) => addr,
        None => config::bind_from_config(&cfg)?
            .unwrap_or_else(|| std::net::SocketAddr::from(([0, 0, 0, 0], 8080))),
    };
    let media_dir = match args.media_dir {
        Some(dir) => dir,
        None => config::media_dir_from_config(&cfg)?,
    };
    tracing::info!(
        bind = %bind,
        media_dir = %media_dir.display(),
        git_sha = env!("MUSIC_HUB_GIT_SHA"),
        "starting music-hub-server"
    );

    let library = Arc::new(Library::new(
        &media_dir,
        config::cache_file_from_config(&cfg),
    ));
    let initial = library.clone();
    let stats = web::block(move || initial.scan(false))
        .await
        .context("initial library scan")?;
    let summary = library.summary();
    tracing::info!(
        tracks = stats.total,
        artists = summary.artists,
        albums = summary.albums,
        "library ready"
    );

    let sessions = SessionRegistry::new();
    let announcer = announce::announcer_for(config::webhook_base_from_config(&cfg).as_deref())?;
    let state = web::Data::new(AppState::new(
        library,
        sessions.clone(),
        build_resolver(&cfg)?,
        announcer.clone(),
        config::enqueue_settings_from_config(&cfg),
        config::announce_dedup_from_config(&cfg),
    ));

    let cancel = CancellationToken::new();
    let monitor = IdleMonitor::new(
        Arc::new(sessions),
        announcer,
        config::idle_settings_from_config(&cfg),
    );
    let monitor_task = actix_web::rt::spawn(monitor.run(cancel.clone()));

    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .service(api::health_route)
            .service(api::library_scan)
            .service(api::library_reindex)
            .service(api::library_set_base)
            .service(api::library_artists)
            .service(api::library_albums)
            .service(api::library_tracks)
            .service(api::sessions_create)
            .service(api::sessions_list)
            .service(api::sessions_delete)
            .service(api::session_enqueue)
            .service(api::session_play)
            .service(api::session_queue)
            .service(api::session_skip)
            .service(api::session_skip_to)
            .service(api::session_clear)
            .service(api::session_stop)
            .service(api::session_track_end)
    })
    .bind(bind)
    .with_context(|| format!("bind {bind}"))?
    .run()
    .await;

    cancel.cancel();
    if let Err(err) = monitor_task.await {
        tracing::warn!(error = %err, "idle monitor task failed");
    }
    served?;
    Ok(())
}
