use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that accept anonymous callers. Reads here go through `MaybeAuthUser`,
/// so a presented token still changes what the caller sees and an invalid one is
/// still rejected.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- Identity ---
        .route("/auth/token", post(handlers::auth::login))
        .route("/auth/token/refresh", post(handlers::auth::refresh_token))
        // Registration creates the identity, its profile and an audit entry together.
        .route("/driver/register", post(handlers::auth::register_driver))
        .route("/passenger/register", post(handlers::auth::register_passenger))
        // --- Fleet reads ---
        .route("/routes", get(handlers::transit_routes::list_routes))
        .route("/routes/{id}", get(handlers::transit_routes::get_route))
        // Filtered to active vehicles for anonymous callers.
        .route("/vehicles", get(handlers::vehicles::list_vehicles))
        .route("/vehicles/{id}", get(handlers::vehicles::get_vehicle))
        .route("/schedules", get(handlers::schedules::list_schedules))
        .route("/schedules/{id}", get(handlers::schedules::get_schedule))
}
