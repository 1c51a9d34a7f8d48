use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::ensure_visible;
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    error::AppResult,
    models::{CreateScheduleRequest, Schedule, ScheduleChanges, check_time_window},
    policy::{Action, Principal, ResourceKind, Target},
    repository::NewSchedule,
};

/// list_schedules
///
/// [Public Route] Anonymous callers and passengers see active schedules only,
/// drivers see the schedules of their own vehicles, admins see everything.
#[utoipa::path(
    get,
    path = "/schedules",
    responses((status = 200, description = "Visible schedules", body = [Schedule]))
)]
pub async fn list_schedules(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Schedule>>> {
    let principal = Principal::from(user.as_ref());
    principal.authorize(Action::List, ResourceKind::Schedule, None)?;
    let schedules = state
        .repo
        .list_schedules(principal.visibility(ResourceKind::Schedule))
        .await?;
    Ok(Json(schedules))
}

#[utoipa::path(
    get,
    path = "/schedules/{id}",
    params(("id" = Uuid, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "Schedule", body = Schedule),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_schedule(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Schedule>> {
    let principal = Principal::from(user.as_ref());
    principal.authorize(Action::Retrieve, ResourceKind::Schedule, None)?;
    let schedule = state.repo.get_schedule(id).await?;
    ensure_visible(
        principal.visibility(ResourceKind::Schedule),
        schedule.owner_user_id,
        schedule.is_active,
        "Schedule",
    )?;
    Ok(Json(schedule))
}

/// create_schedule
///
/// [Authenticated Route] Open to every authenticated role. The vehicle does not
/// have to belong to the caller.
#[utoipa::path(
    post,
    path = "/schedules",
    request_body = CreateScheduleRequest,
    responses(
        (status = 201, description = "Created", body = Schedule),
        (status = 400, description = "Invalid window, bad weekday or unknown vehicle/route"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_schedule(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateScheduleRequest>,
) -> AppResult<(StatusCode, Json<Schedule>)> {
    Principal::from(&user).authorize(Action::Create, ResourceKind::Schedule, None)?;
    check_time_window(payload.arrival_start_time, payload.arrival_end_time)?;
    let days_of_week = payload.days_of_week.normalized()?;

    let schedule = state
        .repo
        .create_schedule(
            &user.actor(),
            NewSchedule {
                vehicle: payload.vehicle,
                route: payload.route,
                arrival_start_time: payload.arrival_start_time,
                arrival_end_time: payload.arrival_end_time,
                days_of_week,
                is_active: payload.is_active.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

#[utoipa::path(
    put,
    path = "/schedules/{id}",
    params(("id" = Uuid, Path, description = "Schedule id")),
    request_body = ScheduleChanges,
    responses(
        (status = 200, description = "Updated", body = Schedule),
        (status = 400, description = "Missing or invalid field"),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn replace_schedule(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<ScheduleChanges>,
) -> AppResult<Json<Schedule>> {
    update(user, state, id, changes, true).await
}

#[utoipa::path(
    patch,
    path = "/schedules/{id}",
    params(("id" = Uuid, Path, description = "Schedule id")),
    request_body = ScheduleChanges,
    responses(
        (status = 200, description = "Updated", body = Schedule),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn patch_schedule(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<ScheduleChanges>,
) -> AppResult<Json<Schedule>> {
    update(user, state, id, changes, false).await
}

async fn authorize_on(user: &AuthUser, state: &AppState, id: Uuid, action: Action) -> AppResult<Schedule> {
    let principal = Principal::from(user);
    let schedule = state.repo.get_schedule(id).await?;
    ensure_visible(
        principal.visibility(ResourceKind::Schedule),
        schedule.owner_user_id,
        schedule.is_active,
        "Schedule",
    )?;
    principal.authorize(
        action,
        ResourceKind::Schedule,
        Some(&Target::owned_by(schedule.owner_user_id)),
    )?;
    Ok(schedule)
}

async fn update(
    user: AuthUser,
    state: AppState,
    id: Uuid,
    changes: ScheduleChanges,
    full: bool,
) -> AppResult<Json<Schedule>> {
    authorize_on(&user, &state, id, Action::Update).await?;
    if full {
        changes.require_complete()?;
    }
    let schedule = state.repo.update_schedule(&user.actor(), id, changes).await?;
    Ok(Json(schedule))
}

#[utoipa::path(
    delete,
    path = "/schedules/{id}",
    params(("id" = Uuid, Path, description = "Schedule id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn delete_schedule(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize_on(&user, &state, id, Action::Delete).await?;
    state.repo.delete_schedule(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
