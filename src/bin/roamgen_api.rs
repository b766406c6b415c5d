//! roamgen_api: a minimal REST facade for the shared dungeon world.
//!
//! Public endpoints (JSON):
//! - GET  /v1/health
//! - GET  /v1/version
//! - GET  /v1/chunk/:cx/:cy            ?debug=true adds generation metadata
//! - GET  /v1/chunk/:cx/:cy/tablets    -> ordered tablet coordinates
//! - GET  /v1/tablet/:cx/:cy/:x/:y    -> appended text entries at a tablet
//! - POST /v1/tablet/:cx/:cy/:x/:y    { text } -> append (404 off-tablet)
//!
//! Notes:
//! - Chunk payloads are S strings of S glyphs, top row first.
//! - The tablet text store is append-only and in-memory; its keyspace is
//!   prefixed by the configuration digest so text written against one
//!   world layout is never served against another.
//! - The world seed itself never leaves the process; /v1/version exposes
//!   only digests.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use roamgen::world::{ChunkDebug, World};
use roamgen::{rng, GenConfig};

/// Hard cap on one appended text entry.
const TABLET_TEXT_MAX: usize = 512;
/// Hard cap on entries per tablet.
const TABLET_ENTRIES_MAX: usize = 256;

// ------------------------------ Tablet store ------------------------------

#[derive(Clone, Serialize)]
struct TabletEntry {
    text: String,
    created_at: i64,
}

/// Append-only in-memory text store keyed by
/// `config_digest:(cx,cy,x,y)`.
struct TabletStore {
    entries: RwLock<std::collections::HashMap<String, Vec<TabletEntry>>>,
}

impl TabletStore {
    fn new() -> Self {
        Self { entries: RwLock::new(std::collections::HashMap::new()) }
    }

    fn key(digest: &str, cx: i32, cy: i32, x: usize, y: usize) -> String {
        format!("{digest}:{cx}:{cy}:{x}:{y}")
    }

    async fn read(&self, key: &str) -> Vec<TabletEntry> {
        self.entries.read().await.get(key).cloned().unwrap_or_default()
    }

    async fn append(&self, key: String, text: String) -> Result<usize, (StatusCode, String)> {
        let mut map = self.entries.write().await;
        let list = map.entry(key).or_default();
        if list.len() >= TABLET_ENTRIES_MAX {
            return Err((StatusCode::CONFLICT, "tablet is full".into()));
        }
        list.push(TabletEntry { text, created_at: Utc::now().timestamp() });
        Ok(list.len())
    }
}

// ------------------------------ Types ------------------------------

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Version {
    api: &'static str,
    chunk_size: usize,
    world_digest: String,
    config_digest: String,
    started_at: i64,
}

#[derive(Deserialize)]
struct ChunkQuery {
    #[serde(default)]
    debug: bool,
}

#[derive(Serialize)]
struct ChunkRes {
    data: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<ChunkDebug>,
}

#[derive(Serialize)]
struct TabletLoc {
    x: usize,
    y: usize,
}

#[derive(Serialize)]
struct TabletLocsRes {
    tablets: Vec<TabletLoc>,
}

#[derive(Serialize)]
struct TabletTextRes {
    entries: Vec<TabletEntry>,
}

#[derive(Deserialize)]
struct AppendReq {
    text: String,
}

#[derive(Serialize)]
struct AppendRes {
    ok: bool,
    entries: usize,
}

#[derive(Clone)]
struct AppState {
    world: Arc<World>,
    tablets: Arc<TabletStore>,
    started_at: i64,
}

// ------------------------------ Helpers ------------------------------

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// ------------------------------ Handlers ------------------------------

async fn health() -> impl IntoResponse {
    Json(Health { status: "ok" })
}

async fn version(State(st): State<AppState>) -> impl IntoResponse {
    Json(Version {
        api: "roamgen-api/0.1",
        chunk_size: st.world.config().chunk_size,
        world_digest: rng::world_digest(st.world.config().world_seed),
        config_digest: st.world.config_digest(),
        started_at: st.started_at,
    })
}

async fn chunk(
    State(st): State<AppState>,
    Path((cx, cy)): Path<(i32, i32)>,
    Query(q): Query<ChunkQuery>,
) -> Result<Json<ChunkRes>, (StatusCode, String)> {
    let chunk = st.world.chunk(cx, cy).await.map_err(internal)?;
    let debug = q.debug.then(|| st.world.debug_view(&chunk));
    Ok(Json(ChunkRes { data: chunk.grid.rows(), debug }))
}

async fn chunk_tablets(
    State(st): State<AppState>,
    Path((cx, cy)): Path<(i32, i32)>,
) -> Result<Json<TabletLocsRes>, (StatusCode, String)> {
    let locs = st.world.tablet_locations(cx, cy).await.map_err(internal)?;
    Ok(Json(TabletLocsRes {
        tablets: locs.into_iter().map(|(x, y)| TabletLoc { x, y }).collect(),
    }))
}

/// Resolve a tablet coordinate against the generated chunk, or 404.
async fn require_tablet(
    st: &AppState,
    cx: i32,
    cy: i32,
    x: usize,
    y: usize,
) -> Result<String, (StatusCode, String)> {
    let locs = st.world.tablet_locations(cx, cy).await.map_err(internal)?;
    if !locs.contains(&(x, y)) {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no tablet at ({x},{y}) in chunk ({cx},{cy})"),
        ));
    }
    Ok(TabletStore::key(&st.world.config_digest(), cx, cy, x, y))
}

async fn tablet_text(
    State(st): State<AppState>,
    Path((cx, cy, x, y)): Path<(i32, i32, usize, usize)>,
) -> Result<Json<TabletTextRes>, (StatusCode, String)> {
    let key = require_tablet(&st, cx, cy, x, y).await?;
    Ok(Json(TabletTextRes { entries: st.tablets.read(&key).await }))
}

async fn tablet_append(
    State(st): State<AppState>,
    Path((cx, cy, x, y)): Path<(i32, i32, usize, usize)>,
    Json(req): Json<AppendReq>,
) -> Result<Json<AppendRes>, (StatusCode, String)> {
    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "text must not be empty".into()));
    }
    if text.chars().count() > TABLET_TEXT_MAX {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("text exceeds {TABLET_TEXT_MAX} characters"),
        ));
    }
    let key = require_tablet(&st, cx, cy, x, y).await?;
    let entries = st.tablets.append(key, text).await?;
    Ok(Json(AppendRes { ok: true, entries }))
}

// ------------------------------ Main ------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "roamgen_api=info,tower_http=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    info!("Starting roamgen API server");

    let addr: SocketAddr = std::env::var("ROAMGEN_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));

    let defaults = GenConfig::default();
    let config = GenConfig {
        world_seed: env_parse("ROAMGEN_WORLD_SEED", defaults.world_seed),
        chunk_size: env_parse("ROAMGEN_CHUNK_SIZE", defaults.chunk_size),
        rooms_min: env_parse("ROAMGEN_ROOMS_MIN", defaults.rooms_min),
        rooms_max: env_parse("ROAMGEN_ROOMS_MAX", defaults.rooms_max),
        openings_min: env_parse("ROAMGEN_OPENINGS_MIN", defaults.openings_min),
        openings_max: env_parse("ROAMGEN_OPENINGS_MAX", defaults.openings_max),
        tablet_prob: env_parse("ROAMGEN_TABLET_PROB", defaults.tablet_prob),
        tablets_max: env_parse("ROAMGEN_TABLETS_MAX", defaults.tablets_max),
        cache_capacity: env_parse("ROAMGEN_CACHE_CAPACITY", defaults.cache_capacity),
        ..defaults
    };

    let world = World::new(config).map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    info!(
        chunk_size = world.config().chunk_size,
        cache_capacity = world.config().cache_capacity,
        config_digest = %world.config_digest(),
        "world configured"
    );

    let allowed_origins =
        std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into());
    let cors = if allowed_origins == "*" {
        warn!("CORS set to permissive mode (*); do not run this in production");
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = allowed_origins.split(',').filter_map(|s| s.trim().parse().ok()).collect();
        info!("CORS configured for origins: {:?}", origins);
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };

    let state = AppState {
        world: Arc::new(world),
        tablets: Arc::new(TabletStore::new()),
        started_at: Utc::now().timestamp(),
    };

    let app = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/version", get(version))
        .route("/v1/chunk/:cx/:cy", get(chunk))
        .route("/v1/chunk/:cx/:cy/tablets", get(chunk_tablets))
        .route("/v1/tablet/:cx/:cy/:x/:y", get(tablet_text).post(tablet_append))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("listening on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
