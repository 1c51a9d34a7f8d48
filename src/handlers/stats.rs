use axum::{Json, extract::State};

use crate::{AppState, auth::AuthUser, error::AppResult, models::Stats, policy::Principal, stats};

/// get_stats
///
/// [Authenticated Route] Dashboard figures shaped by the caller's role.
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Admin or driver stats", body = Stats),
        (status = 403, description = "Passengers have no dashboard"),
        (status = 404, description = "Driver profile not found")
    )
)]
pub async fn get_stats(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<Stats>> {
    let principal = Principal::from(&user);
    Ok(Json(stats::compute_stats(&principal, state.repo.as_ref()).await?))
}
