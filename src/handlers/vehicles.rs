use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;
use validator::Validate;

use super::ensure_visible;
use crate::{
    AppState,
    auth::{AuthUser, MaybeAuthUser},
    error::{AppError, AppResult},
    models::{CreateVehicleRequest, Vehicle, VehicleChanges},
    policy::{Action, Principal, ResourceKind, Target},
    repository::NewVehicle,
};

const DEFAULT_VEHICLE_TYPE: &str = "Daladala";

/// list_vehicles
///
/// [Public Route] Anonymous callers and passengers see active vehicles, drivers
/// see their own (active or not), admins see everything.
#[utoipa::path(
    get,
    path = "/vehicles",
    responses((status = 200, description = "Visible vehicles", body = [Vehicle]))
)]
pub async fn list_vehicles(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Vehicle>>> {
    let principal = Principal::from(user.as_ref());
    principal.authorize(Action::List, ResourceKind::Vehicle, None)?;
    let vehicles = state
        .repo
        .list_vehicles(principal.visibility(ResourceKind::Vehicle))
        .await?;
    Ok(Json(vehicles))
}

#[utoipa::path(
    get,
    path = "/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle id")),
    responses(
        (status = 200, description = "Vehicle", body = Vehicle),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_vehicle(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vehicle>> {
    let principal = Principal::from(user.as_ref());
    principal.authorize(Action::Retrieve, ResourceKind::Vehicle, None)?;
    let vehicle = state.repo.get_vehicle(id).await?;
    ensure_visible(
        principal.visibility(ResourceKind::Vehicle),
        vehicle.owner_user_id,
        vehicle.is_active,
        "Vehicle",
    )?;
    Ok(Json(vehicle))
}

/// create_vehicle
///
/// [Authenticated Route] Drivers always own what they create; the `driver` field
/// of the payload is ignored for them. Admins must name the owning profile.
#[utoipa::path(
    post,
    path = "/vehicles",
    request_body = CreateVehicleRequest,
    responses(
        (status = 201, description = "Created", body = Vehicle),
        (status = 400, description = "Invalid payload, unknown driver or duplicate plate"),
        (status = 403, description = "Caller may not create vehicles"),
        (status = 404, description = "Calling driver has no profile")
    )
)]
pub async fn create_vehicle(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateVehicleRequest>,
) -> AppResult<(StatusCode, Json<Vehicle>)> {
    let principal = Principal::from(&user);
    principal.authorize(Action::Create, ResourceKind::Vehicle, None)?;
    payload.validate()?;

    let driver = match principal {
        Principal::Driver { id } => {
            let profile = state
                .repo
                .driver_profile_for(id)
                .await?
                .ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))?;
            if payload.driver.is_some_and(|requested| requested != profile.id) {
                tracing::debug!(driver_id = %profile.id, "ignoring payload owner for driver-created vehicle");
            }
            profile.id
        }
        _ => payload
            .driver
            .ok_or_else(|| AppError::Validation("driver is required".to_string()))?,
    };

    let vehicle = state
        .repo
        .create_vehicle(
            &user.actor(),
            NewVehicle {
                driver,
                plate_number: payload.plate_number,
                vehicle_type: payload
                    .vehicle_type
                    .unwrap_or_else(|| DEFAULT_VEHICLE_TYPE.to_string()),
                capacity: payload.capacity,
                color: payload.color,
                is_active: payload.is_active.unwrap_or(true),
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

#[utoipa::path(
    put,
    path = "/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle id")),
    request_body = VehicleChanges,
    responses(
        (status = 200, description = "Updated", body = Vehicle),
        (status = 400, description = "Missing field or duplicate plate"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn replace_vehicle(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<VehicleChanges>,
) -> AppResult<Json<Vehicle>> {
    update(user, state, id, changes, true).await
}

#[utoipa::path(
    patch,
    path = "/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle id")),
    request_body = VehicleChanges,
    responses(
        (status = 200, description = "Updated", body = Vehicle),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn patch_vehicle(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(changes): Json<VehicleChanges>,
) -> AppResult<Json<Vehicle>> {
    update(user, state, id, changes, false).await
}

/// Loads the vehicle and applies the object-level checks shared by update and delete.
async fn authorize_on(user: &AuthUser, state: &AppState, id: Uuid, action: Action) -> AppResult<Vehicle> {
    let principal = Principal::from(user);
    let vehicle = state.repo.get_vehicle(id).await?;
    ensure_visible(
        principal.visibility(ResourceKind::Vehicle),
        vehicle.owner_user_id,
        vehicle.is_active,
        "Vehicle",
    )?;
    principal.authorize(
        action,
        ResourceKind::Vehicle,
        Some(&Target::owned_by(vehicle.owner_user_id)),
    )?;
    Ok(vehicle)
}

async fn update(
    user: AuthUser,
    state: AppState,
    id: Uuid,
    changes: VehicleChanges,
    full: bool,
) -> AppResult<Json<Vehicle>> {
    authorize_on(&user, &state, id, Action::Update).await?;
    if full {
        changes.require_complete()?;
    }
    changes.validate()?;
    let vehicle = state.repo.update_vehicle(&user.actor(), id, changes).await?;
    Ok(Json(vehicle))
}

#[utoipa::path(
    delete,
    path = "/vehicles/{id}",
    params(("id" = Uuid, Path, description = "Vehicle id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn delete_vehicle(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize_on(&user, &state, id, Action::Delete).await?;
    state.repo.delete_vehicle(&user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
