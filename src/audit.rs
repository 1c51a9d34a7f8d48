//! Audit logger.
//!
//! Audit entries are derived here from the record a mutation produced and are
//! appended by the repositories inside the same transaction as the mutation
//! itself. There is no update or delete for `SystemLog` anywhere in the crate.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::{AuditAction, DriverProfile, PassengerProfile, Role, Route, Schedule, SystemLog, Vehicle};

/// Actor
///
/// Who performed a mutation. `id` is `None` for system-internal writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub role: Option<Role>,
}

impl Actor {
    pub fn user(id: Uuid, role: Role) -> Self {
        Self { id: Some(id), role: Some(role) }
    }

    pub fn system() -> Self {
        Self { id: None, role: None }
    }

    fn role_label(&self) -> &'static str {
        self.role.map_or("System", |r| r.label())
    }
}

/// AuditEntry
///
/// A not-yet-persisted `SystemLog` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub user: Option<Uuid>,
    pub action: AuditAction,
    pub resource: String,
    pub details: String,
}

impl AuditEntry {
    fn new(actor: &Actor, action: AuditAction, resource: String, details: impl Into<String>) -> Self {
        Self {
            user: actor.id,
            action,
            resource,
            details: details.into(),
        }
    }

    // --- Drivers & registration ---

    pub fn driver_registered(profile: &DriverProfile) -> Self {
        Self {
            user: Some(profile.user_id),
            action: AuditAction::Create,
            resource: format!("Driver: {}", profile.full_name),
            details: "Registered as Driver".to_string(),
        }
    }

    pub fn passenger_registered(profile: &PassengerProfile) -> Self {
        Self {
            user: Some(profile.user_id),
            action: AuditAction::Create,
            resource: format!("Passenger: {}", profile.full_name),
            details: "Registered as Passenger".to_string(),
        }
    }

    pub fn admin_bootstrapped(username: &str) -> Self {
        Self::new(
            &Actor::system(),
            AuditAction::Create,
            format!("Admin: {}", username),
            "Bootstrapped from configuration",
        )
    }

    /// Updates that carry `is_approved` are approvals and restate the status.
    pub fn driver_updated(actor: &Actor, profile: &DriverProfile, approval_touched: bool) -> Self {
        let resource = format!("Driver: {}", profile.full_name);
        if approval_touched {
            Self::new(
                actor,
                AuditAction::Approval,
                resource,
                format!("Status changed to {}", profile.status_text()),
            )
        } else {
            Self::new(actor, AuditAction::Update, resource, "Profile updated")
        }
    }

    pub fn driver_deleted(actor: &Actor, profile: &DriverProfile) -> Self {
        Self::new(
            actor,
            AuditAction::Delete,
            format!("Driver: {}", profile.full_name),
            "Profile removed",
        )
    }

    // --- Routes ---

    pub fn route_created(actor: &Actor, route: &Route) -> Self {
        Self::new(actor, AuditAction::Create, route_resource(route), "")
    }

    pub fn route_updated(actor: &Actor, route: &Route, changed: &[&str]) -> Self {
        let details = if changed.is_empty() {
            "No fields changed".to_string()
        } else {
            format!("Updated fields: {}", changed.join(", "))
        };
        Self::new(actor, AuditAction::Update, route_resource(route), details)
    }

    pub fn route_deleted(actor: &Actor, route: &Route) -> Self {
        Self::new(actor, AuditAction::Delete, route_resource(route), "")
    }

    // --- Vehicles ---

    pub fn vehicle_created(actor: &Actor, vehicle: &Vehicle) -> Self {
        Self::new(
            actor,
            AuditAction::Create,
            vehicle_resource(vehicle),
            format!("Added by {}", actor.role_label()),
        )
    }

    pub fn vehicle_updated(actor: &Actor, vehicle: &Vehicle) -> Self {
        Self::new(
            actor,
            AuditAction::Update,
            vehicle_resource(vehicle),
            format!("Updated by {}", actor.role_label()),
        )
    }

    pub fn vehicle_deleted(actor: &Actor, vehicle: &Vehicle) -> Self {
        Self::new(
            actor,
            AuditAction::Delete,
            vehicle_resource(vehicle),
            format!("Removed by {}", actor.role_label()),
        )
    }

    // --- Schedules ---

    pub fn schedule_created(actor: &Actor, schedule: &Schedule) -> Self {
        Self::schedule(actor, AuditAction::Create, schedule)
    }

    pub fn schedule_updated(actor: &Actor, schedule: &Schedule) -> Self {
        Self::schedule(actor, AuditAction::Update, schedule)
    }

    pub fn schedule_deleted(actor: &Actor, schedule: &Schedule) -> Self {
        Self::schedule(actor, AuditAction::Delete, schedule)
    }

    fn schedule(actor: &Actor, action: AuditAction, schedule: &Schedule) -> Self {
        Self::new(
            actor,
            action,
            format!("Schedule: {}", schedule.vehicle_plate),
            format!("Route: {}", schedule.route_label),
        )
    }
}

fn route_resource(route: &Route) -> String {
    format!("Route: {}", route.display())
}

fn vehicle_resource(vehicle: &Vehicle) -> String {
    format!("Vehicle: {}", vehicle.plate_number)
}

/// record
///
/// Appends one entry on the caller's transaction connection. The caller must
/// abort the transaction when this fails.
pub async fn record(conn: &mut PgConnection, entry: &AuditEntry) -> Result<SystemLog, sqlx::Error> {
    let log = sqlx::query_as::<_, SystemLog>(
        r#"
        WITH inserted AS (
            INSERT INTO system_logs (user_id, action, resource, details)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, action, resource, details, created_at
        )
        SELECT i.id, i.user_id AS "user", u.username, i.action, i.resource, i.details,
               i.created_at AS "timestamp"
        FROM inserted i LEFT JOIN users u ON u.id = i.user_id
        "#,
    )
    .bind(entry.user)
    .bind(entry.action)
    .bind(&entry.resource)
    .bind(&entry.details)
    .fetch_one(conn)
    .await?;

    tracing::info!(
        log_id = log.id,
        action = ?log.action,
        resource = %log.resource,
        "audit entry recorded"
    );
    Ok(log)
}
