use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core: access policy, audit derivation and the store contract.
pub mod audit;
pub mod policy;
pub mod repository;
pub mod stats;

// Ambient services.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;

// Route tables, one per access tier.
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and the request/response schemas.
/// Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register_driver, handlers::auth::register_passenger,
        handlers::auth::login, handlers::auth::refresh_token,
        handlers::auth::get_me, handlers::auth::get_my_driver_profile,
        handlers::drivers::list_drivers, handlers::drivers::get_driver,
        handlers::drivers::replace_driver, handlers::drivers::patch_driver,
        handlers::drivers::delete_driver,
        handlers::vehicles::list_vehicles, handlers::vehicles::get_vehicle,
        handlers::vehicles::create_vehicle, handlers::vehicles::replace_vehicle,
        handlers::vehicles::patch_vehicle, handlers::vehicles::delete_vehicle,
        handlers::transit_routes::list_routes, handlers::transit_routes::get_route,
        handlers::transit_routes::create_route, handlers::transit_routes::replace_route,
        handlers::transit_routes::patch_route, handlers::transit_routes::delete_route,
        handlers::schedules::list_schedules, handlers::schedules::get_schedule,
        handlers::schedules::create_schedule, handlers::schedules::replace_schedule,
        handlers::schedules::patch_schedule, handlers::schedules::delete_schedule,
        handlers::logs::list_logs, handlers::logs::get_log,
        handlers::stats::get_stats,
    ),
    components(
        schemas(
            models::Role, models::AuditAction, models::User, models::DriverProfile,
            models::PassengerProfile, models::Vehicle, models::Route, models::Schedule,
            models::SystemLog, models::RegisterDriverRequest, models::RegisterPassengerRequest,
            models::LoginRequest, models::RefreshRequest, models::TokenPair, models::AccessToken,
            models::DriverChanges, models::CreateVehicleRequest, models::VehicleChanges,
            models::CreateRouteRequest, models::RouteChanges, models::CreateScheduleRequest,
            models::ScheduleChanges, models::AdminStats, models::DriverStats, models::Stats,
        )
    ),
    tags(
        (name = "fleet-admin", description = "Transit fleet administration API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared state: the store behind its trait object and the immutable
/// configuration. Handlers pull pieces out of it through `FromRef`.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Loaded once at startup and never mutated.
    pub config: AppConfig,
}

// --- Sub-state extraction ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the authenticated and admin routers. Extracting `AuthUser` rejects the
/// request with 401 when credentials are missing or invalid, so handlers behind it
/// never run for anonymous callers.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, the authentication gate and the observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Correlation header shared by the request-id layers.
    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // Generates a UUID x-request-id for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echoes the request id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the method, URI and request id, so every log
/// line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
