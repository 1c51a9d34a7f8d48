//! Role-specific dashboard projections served by `GET /stats`.

use crate::{
    error::{AppError, AppResult},
    models::{DriverStats, Stats},
    policy::Principal,
    repository::Repository,
};

/// Placeholder until trips are rated; every driver reports the same value.
pub const DEFAULT_DRIVER_RATING: f64 = 4.8;

/// compute_stats
///
/// Admins get fleet-wide counters. Drivers get figures for their own profile and
/// need one to exist. Passengers are forbidden and anonymous callers unauthorized.
pub async fn compute_stats(principal: &Principal, repo: &dyn Repository) -> AppResult<Stats> {
    match principal {
        Principal::Admin { .. } => Ok(Stats::Admin(repo.admin_stats().await?)),
        Principal::Driver { id } => {
            let profile = repo
                .driver_profile_for(*id)
                .await?
                .ok_or_else(|| AppError::NotFound("Driver profile not found".to_string()))?;

            let total_trips = repo.count_driver_schedules(profile.id).await?;
            let active_vehicle = repo
                .first_active_plate(profile.id)
                .await?
                .unwrap_or_else(|| "None".to_string());

            Ok(Stats::Driver(DriverStats {
                total_trips,
                active_vehicle,
                rating: DEFAULT_DRIVER_RATING,
                status: if profile.is_approved { "Ready" } else { "Pending Approval" }.to_string(),
            }))
        }
        Principal::Passenger { .. } => Err(AppError::Forbidden(
            "Stats are available to admins and drivers only".to_string(),
        )),
        Principal::Anonymous => Err(AppError::Unauthorized(
            "Authentication credentials were not provided".to_string(),
        )),
    }
}
