use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    auth::AuthUser,
    error::AppResult,
    models::SystemLog,
    policy::{Action, Principal, ResourceKind},
};

/// list_logs
///
/// [Admin Route] The audit trail, newest first. There are no write endpoints for
/// logs; entries only appear as a side effect of other mutations.
#[utoipa::path(
    get,
    path = "/logs",
    responses(
        (status = 200, description = "Audit entries, newest first", body = [SystemLog]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_logs(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<Vec<SystemLog>>> {
    Principal::from(&user).authorize(Action::List, ResourceKind::SystemLog, None)?;
    Ok(Json(state.repo.list_logs().await?))
}

#[utoipa::path(
    get,
    path = "/logs/{id}",
    params(("id" = i64, Path, description = "Log entry id")),
    responses(
        (status = 200, description = "Audit entry", body = SystemLog),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_log(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<SystemLog>> {
    Principal::from(&user).authorize(Action::Retrieve, ResourceKind::SystemLog, None)?;
    Ok(Json(state.repo.get_log(id).await?))
}
