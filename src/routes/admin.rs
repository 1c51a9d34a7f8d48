use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Read-only access to the audit trail. Mounted behind the same authentication
/// layer as the authenticated routes; the policy then admits only Admins.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /logs
        // Newest first.
        .route("/logs", get(handlers::logs::list_logs))
        .route("/logs/{id}", get(handlers::logs::get_log))
}
