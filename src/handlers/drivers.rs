use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    error::AppResult,
    models::{DriverChanges, DriverProfile},
    policy::{Action, Principal, ResourceKind},
};

/// list_drivers
///
/// [Authenticated Route] Every driver profile, for any authenticated caller.
#[utoipa::path(
    get,
    path = "/drivers",
    responses(
        (status = 200, description = "Driver profiles", body = [DriverProfile]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_drivers(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<DriverProfile>>> {
    Principal::from(&user).authorize(Action::List, ResourceKind::DriverProfile, None)?;
    Ok(Json(state.repo.list_drivers().await?))
}

#[utoipa::path(
    get,
    path = "/drivers/{id}",
    params(("id" = Uuid, Path, description = "Driver profile id")),
    responses(
        (status = 200, description = "Driver profile", body = DriverProfile),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_driver(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DriverProfile>> {
    Principal::from(&user).authorize(Action::Retrieve, ResourceKind::DriverProfile, None)?;
    Ok(Json(state.repo.get_driver(id).await?))
}

/// replace_driver
///
/// [Authenticated Route, Admin] Full update. Every mutable field must be present.
#[utoipa::path(
    put,
    path = "/drivers/{id}",
    params(("id" = Uuid, Path, description = "Driver profile id")),
    request_body = DriverChanges,
    responses(
        (status = 200, description = "Updated", body = DriverProfile),
        (status = 400, description = "Missing field or duplicate key"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn replace_driver(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<DriverChanges>,
) -> AppResult<Json<DriverProfile>> {
    update(user, state, id, changes, true).await
}

/// patch_driver
///
/// [Authenticated Route, Admin] Partial update. Sending `is_approved` records an
/// APPROVAL entry instead of a plain UPDATE.
#[utoipa::path(
    patch,
    path = "/drivers/{id}",
    params(("id" = Uuid, Path, description = "Driver profile id")),
    request_body = DriverChanges,
    responses(
        (status = 200, description = "Updated", body = DriverProfile),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn patch_driver(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<DriverChanges>,
) -> AppResult<Json<DriverProfile>> {
    update(user, state, id, changes, false).await
}

/// `full` marks a PUT; completeness is only checked once the caller is allowed in.
async fn update(
    user: AuthUser,
    state: AppState,
    id: Uuid,
    changes: DriverChanges,
    full: bool,
) -> AppResult<Json<DriverProfile>> {
    Principal::from(&user).authorize(Action::Update, ResourceKind::DriverProfile, None)?;
    if full {
        changes.require_complete()?;
    }
    changes.validate()?;
    let profile = state.repo.update_driver(&user.actor(), id, changes).await?;
    Ok(Json(profile))
}

#[utoipa::path(
    delete,
    path = "/drivers/{id}",
    params(("id" = Uuid, Path, description = "Driver profile id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_driver(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    Principal::from(&user).authorize(Action::Delete, ResourceKind::DriverProfile, None)?;
    state.repo.delete_driver(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
