use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Everything here requires a valid identity; the layer in `create_router`
/// rejects anonymous requests with 401 before a handler runs. Role and ownership
/// rules are then applied per handler by the access policy.
///
/// Paths shared with the public router (e.g. `/vehicles`) only add write methods
/// here and are merged with the public reads.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        .route("/me", get(handlers::auth::get_me))
        // --- Driver profiles ---
        .route("/drivers", get(handlers::drivers::list_drivers))
        // Static segment; takes precedence over /drivers/{id}.
        .route("/drivers/me", get(handlers::auth::get_my_driver_profile))
        .route(
            "/drivers/{id}",
            get(handlers::drivers::get_driver)
                .put(handlers::drivers::replace_driver)
                .patch(handlers::drivers::patch_driver)
                .delete(handlers::drivers::delete_driver),
        )
        // --- Routes (Admin writes) ---
        .route("/routes", post(handlers::transit_routes::create_route))
        .route(
            "/routes/{id}",
            put(handlers::transit_routes::replace_route)
                .patch(handlers::transit_routes::patch_route)
                .delete(handlers::transit_routes::delete_route),
        )
        // --- Vehicles (owner driver or Admin) ---
        .route("/vehicles", post(handlers::vehicles::create_vehicle))
        .route(
            "/vehicles/{id}",
            put(handlers::vehicles::replace_vehicle)
                .patch(handlers::vehicles::patch_vehicle)
                .delete(handlers::vehicles::delete_vehicle),
        )
        // --- Schedules (any authenticated caller) ---
        .route("/schedules", post(handlers::schedules::create_schedule))
        .route(
            "/schedules/{id}",
            put(handlers::schedules::replace_schedule)
                .patch(handlers::schedules::patch_schedule)
                .delete(handlers::schedules::delete_schedule),
        )
        // GET /stats
        .route("/stats", get(handlers::stats::get_stats))
}
