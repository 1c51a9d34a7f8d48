use axum::{Json, extract::State, http::StatusCode};
use validator::Validate;

use crate::{
    AppState,
    auth::{self, AuthUser, TokenType},
    error::{AppError, AppResult},
    models::{
        AccessToken, DriverProfile, LoginRequest, PassengerProfile, RefreshRequest,
        RegisterDriverRequest, RegisterPassengerRequest, Role, TokenPair, User,
    },
    policy::{Action, Principal, ResourceKind},
    repository::{NewDriver, NewPassenger},
};

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("No active account found with the given credentials".to_string())
}

/// register_driver
///
/// [Public Route] Creates a Driver identity and its profile. The profile starts
/// unapproved; an Admin flips `is_approved` later.
#[utoipa::path(
    post,
    path = "/driver/register",
    request_body = RegisterDriverRequest,
    responses(
        (status = 201, description = "Driver registered", body = DriverProfile),
        (status = 400, description = "Invalid payload or duplicate username / national id / license")
    )
)]
pub async fn register_driver(
    State(state): State<AppState>,
    Json(payload): Json<RegisterDriverRequest>,
) -> AppResult<(StatusCode, Json<DriverProfile>)> {
    Principal::Anonymous.authorize(Action::Create, ResourceKind::DriverProfile, None)?;
    payload.validate()?;
    let password_hash = auth::hash_password(payload.password, state.config.bcrypt_cost).await?;

    let profile = state
        .repo
        .register_driver(NewDriver {
            username: payload.username,
            password_hash,
            email: payload.email,
            phone: payload.phone,
            full_name: payload.full_name,
            national_id: payload.national_id,
            license_number: payload.license_number,
        })
        .await?;

    tracing::info!(driver_id = %profile.id, "driver registered");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// register_passenger
///
/// [Public Route] Creates a Passenger identity with its profile.
#[utoipa::path(
    post,
    path = "/passenger/register",
    request_body = RegisterPassengerRequest,
    responses(
        (status = 201, description = "Passenger registered", body = PassengerProfile),
        (status = 400, description = "Invalid payload or duplicate username")
    )
)]
pub async fn register_passenger(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPassengerRequest>,
) -> AppResult<(StatusCode, Json<PassengerProfile>)> {
    payload.validate()?;
    let password_hash = auth::hash_password(payload.password, state.config.bcrypt_cost).await?;

    let profile = state
        .repo
        .register_passenger(NewPassenger {
            username: payload.username,
            password_hash,
            email: payload.email,
            phone: payload.phone,
            full_name: payload.full_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// login
///
/// [Public Route] Exchanges username and password for an access/refresh pair.
/// Unknown usernames and wrong passwords get the same answer.
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    let creds = state
        .repo
        .find_credentials(&payload.username)
        .await?
        .ok_or_else(invalid_credentials)?;

    if !auth::verify_password(payload.password, creds.password_hash).await? {
        tracing::debug!(username = %creds.username, "login rejected");
        return Err(invalid_credentials());
    }

    let user = AuthUser {
        id: creds.id,
        role: creds.role,
        username: creds.username,
    };
    Ok(Json(TokenPair {
        access: auth::issue_token(&state.config, &user, TokenType::Access)?,
        refresh: auth::issue_token(&state.config, &user, TokenType::Refresh)?,
    }))
}

/// refresh_token
///
/// [Public Route] Issues a new access token from a refresh token. The identity is
/// re-read so a deleted account cannot keep refreshing.
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessToken),
        (status = 401, description = "Invalid, expired or wrong-type token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AccessToken>> {
    let claims = auth::verify_token(&state.config, &payload.refresh, TokenType::Refresh)?;
    let user = state
        .repo
        .get_identity(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let access = auth::issue_token(&state.config, &AuthUser::from(&user), TokenType::Access)?;
    Ok(Json(AccessToken { access }))
}

/// get_me
///
/// [Authenticated Route] The caller's identity summary.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current identity", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<User>> {
    let identity = state
        .repo
        .get_identity(user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(identity))
}

/// get_my_driver_profile
///
/// [Authenticated Route] The calling Driver's own profile.
#[utoipa::path(
    get,
    path = "/drivers/me",
    responses(
        (status = 200, description = "Own driver profile", body = DriverProfile),
        (status = 403, description = "Caller is not a driver"),
        (status = 404, description = "Driver profile not found")
    )
)]
pub async fn get_my_driver_profile(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DriverProfile>> {
    if user.role != Role::Driver {
        return Err(AppError::Forbidden("Only drivers have a driver profile".to_string()));
    }
    let profile = state
        .repo
        .driver_profile_for(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))?;
    Ok(Json(profile))
}
