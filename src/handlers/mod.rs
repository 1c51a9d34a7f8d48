//! HTTP handlers, one module per resource.
//!
//! Every handler resolves the caller into a `Principal`, asks the policy before
//! touching the store for anything it would change, and returns `AppResult` so
//! denials and store failures render through `AppError`.

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    policy::Visibility,
};

pub mod auth;
pub mod drivers;
pub mod logs;
pub mod schedules;
pub mod stats;
pub mod transit_routes;
pub mod vehicles;

/// Records outside the caller's visibility are reported as absent, never as forbidden.
pub(crate) fn ensure_visible(visibility: Visibility, owner: Uuid, is_active: bool, what: &str) -> AppResult<()> {
    if visibility.admits(Some(owner), is_active) {
        Ok(())
    } else {
        Err(AppError::not_found(what))
    }
}
