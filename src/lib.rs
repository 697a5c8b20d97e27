pub mod error;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod queries;
pub mod reservation;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use handlers::{create_booking, healthz_live, healthz_ready, list_bookings, list_classes, root};
use tower_http::LatencyUnit;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::openapi::ApiDoc;
use crate::queries::QueryService;
use crate::reservation::ReservationEngine;
use crate::settings::Settings;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Settings,
    pub(crate) engine: ReservationEngine,
    pub(crate) queries: QueryService,
}

impl AppState {
    pub fn new(settings: Settings, storage: Arc<Storage>) -> Self {
        Self {
            engine: ReservationEngine::new(Arc::clone(&storage), settings.lock_timeout()),
            queries: QueryService::new(storage),
            settings,
        }
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let storage = Arc::new(Storage::connect(&settings.database_url).await?);
    info!("Opened database {}", settings.database_url);
    if settings.seed_sample_data {
        let created = seed::load_sample_classes(&storage, chrono::Utc::now()).await?;
        info!("Seeded {created} sample classes");
    }

    let state = AppState::new(settings, storage);
    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    let app = build_router(state);

    info!("Starting Fitness Booking API on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/classes", get(list_classes))
        .route("/book", post(create_booking))
        .route("/bookings", get(list_bookings))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(CorsLayer::permissive()).layer(trace_layer)
}
