use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    error::AppResult,
    models::{CreateRouteRequest, Route, RouteChanges, check_distance},
    policy::{Action, Principal, ResourceKind},
    repository::NewRoute,
};

#[utoipa::path(
    get,
    path = "/routes",
    responses((status = 200, description = "All routes", body = [Route]))
)]
pub async fn list_routes(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Route>>> {
    Principal::from(user.as_ref()).authorize(Action::List, ResourceKind::Route, None)?;
    Ok(Json(state.repo.list_routes().await?))
}

#[utoipa::path(
    get,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 200, description = "Route", body = Route),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_route(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Route>> {
    Principal::from(user.as_ref()).authorize(Action::Retrieve, ResourceKind::Route, None)?;
    Ok(Json(state.repo.get_route(id).await?))
}

/// create_route
///
/// [Authenticated Route, Admin]
#[utoipa::path(
    post,
    path = "/routes",
    request_body = CreateRouteRequest,
    responses(
        (status = 201, description = "Created", body = Route),
        (status = 400, description = "Invalid payload"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn create_route(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateRouteRequest>,
) -> AppResult<(StatusCode, Json<Route>)> {
    Principal::from(&user).authorize(Action::Create, ResourceKind::Route, None)?;
    payload.validate()?;
    if let Some(distance) = payload.distance {
        check_distance(distance)?;
    }

    let route = state
        .repo
        .create_route(
            &user.actor(),
            NewRoute {
                start_point: payload.start_point,
                end_point: payload.end_point,
                distance: payload.distance,
                is_active: payload.is_active.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(route)))
}

#[utoipa::path(
    put,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route id")),
    request_body = RouteChanges,
    responses(
        (status = 200, description = "Updated", body = Route),
        (status = 400, description = "Missing or invalid field"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn replace_route(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<RouteChanges>,
) -> AppResult<Json<Route>> {
    update(user, state, id, changes, true).await
}

/// patch_route
///
/// [Authenticated Route, Admin] The audit entry lists the fields whose value
/// actually changed.
#[utoipa::path(
    patch,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route id")),
    request_body = RouteChanges,
    responses(
        (status = 200, description = "Updated", body = Route),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn patch_route(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<RouteChanges>,
) -> AppResult<Json<Route>> {
    update(user, state, id, changes, false).await
}

async fn update(
    user: AuthUser,
    state: AppState,
    id: Uuid,
    changes: RouteChanges,
    full: bool,
) -> AppResult<Json<Route>> {
    Principal::from(&user).authorize(Action::Update, ResourceKind::Route, None)?;
    if full {
        changes.require_complete()?;
    }
    changes.validate()?;
    let route = state.repo.update_route(&user.actor(), id, changes).await?;
    Ok(Json(route))
}

#[utoipa::path(
    delete,
    path = "/routes/{id}",
    params(("id" = Uuid, Path, description = "Route id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_route(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    Principal::from(&user).authorize(Action::Delete, ResourceKind::Route, None)?;
    state.repo.delete_route(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
