use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

// --- Enumerations (Mapped to Postgres enum types) ---

/// Role
///
/// The fixed role of an identity. Assigned by the registration flow and never
/// changed in place. Stored as the `user_role` Postgres enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    Admin,
    Driver,
    Passenger,
}

impl Role {
    /// Human readable label used in audit details ("Added by Driver").
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Driver => "Driver",
            Role::Passenger => "Passenger",
        }
    }
}

/// AuditAction
///
/// The kind of mutation a `SystemLog` row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approval,
}

// --- Core Records ---

/// User
///
/// The identity record from the `users` table. The password hash lives in a
/// separate row type (`Credentials`) so it can never leak through serialization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
}

/// Credentials
///
/// Internal row used only by the login flow.
#[derive(Debug, Clone, FromRow)]
pub struct Credentials {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
    pub password_hash: String,
}

/// DriverProfile
///
/// One-to-one extension of a Driver identity. `is_approved` starts false and is
/// only toggled by an Admin.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct DriverProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    // Joined from users.
    pub username: String,
    pub full_name: String,
    pub national_id: String,
    pub license_number: String,
    pub is_approved: bool,
}

impl DriverProfile {
    pub fn status_text(&self) -> &'static str {
        if self.is_approved { "Approved" } else { "Pending" }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PassengerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub full_name: String,
}

/// Vehicle
///
/// `driver` is the owning DriverProfile id and is read-only once set.
/// `owner_user_id` is the identity behind that profile; it drives visibility and
/// ownership checks and is not part of the public payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Vehicle {
    pub id: Uuid,
    pub driver: Uuid,
    pub driver_name: String,
    #[serde(skip)]
    pub owner_user_id: Uuid,
    pub plate_number: String,
    pub vehicle_type: String,
    pub capacity: i32,
    pub color: String,
    pub is_active: bool,
}

/// Route
///
/// Publicly readable; created and mutated by Admins only.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Route {
    pub id: Uuid,
    pub start_point: String,
    pub end_point: String,
    /// Kilometres, two decimal places.
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>, example = "12.50")]
    pub distance: Option<Decimal>,
    pub is_active: bool,
}

impl Route {
    /// "{start} - {end}", the form used in audit entries and schedule labels.
    pub fn display(&self) -> String {
        format!("{} - {}", self.start_point, self.end_point)
    }

    pub fn check(&self) -> AppResult<()> {
        check_non_blank("start_point", &self.start_point)?;
        check_non_blank("end_point", &self.end_point)?;
        if let Some(distance) = self.distance {
            check_distance(distance)?;
        }
        Ok(())
    }
}

/// Schedule
///
/// `vehicle` and `route` are immutable after creation; `vehicle_plate` and
/// `route_label` are joined, read-only projections of them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Schedule {
    pub id: Uuid,
    pub vehicle: Uuid,
    pub route: Uuid,
    pub vehicle_plate: String,
    pub route_label: String,
    #[serde(skip)]
    pub owner_user_id: Uuid,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "07:30:00")]
    pub arrival_start_time: NaiveTime,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "09:00:00")]
    pub arrival_end_time: NaiveTime,
    #[sqlx(json)]
    pub days_of_week: Vec<String>,
    pub is_active: bool,
}

impl Schedule {
    pub fn check(&self) -> AppResult<()> {
        check_time_window(self.arrival_start_time, self.arrival_end_time)?;
        if self.days_of_week.is_empty() {
            return Err(AppError::Validation("days_of_week must not be empty".to_string()));
        }
        Ok(())
    }
}

/// SystemLog
///
/// An immutable audit row. `user` is null once the acting identity is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct SystemLog {
    // BIGSERIAL: insertion order breaks timestamp ties.
    pub id: i64,
    pub user: Option<Uuid>,
    pub username: Option<String>,
    pub action: AuditAction,
    pub resource: String,
    pub details: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterDriverRequest
///
/// Public registration payload (POST /driver/register). Produces a Driver identity
/// with an unapproved DriverProfile.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RegisterDriverRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(max = 15))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(length(min = 1, max = 50))]
    pub national_id: String,
    #[validate(length(min = 1, max = 50))]
    pub license_number: String,
}

/// RegisterPassengerRequest
///
/// Public registration payload (POST /passenger/register).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RegisterPassengerRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(max = 15))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// TokenPair
///
/// Issued by POST /auth/token. The access token embeds the role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessToken {
    pub access: String,
}

/// DriverChanges
///
/// Admin update payload for a DriverProfile (PUT/PATCH /drivers/{id}).
/// Carrying `is_approved` turns the audit entry into an APPROVAL.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct DriverChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50))]
    pub national_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50))]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_approved: Option<bool>,
}

impl DriverChanges {
    pub fn apply_to(&self, profile: &mut DriverProfile) {
        if let Some(v) = &self.full_name {
            profile.full_name = v.clone();
        }
        if let Some(v) = &self.national_id {
            profile.national_id = v.clone();
        }
        if let Some(v) = &self.license_number {
            profile.license_number = v.clone();
        }
        if let Some(v) = self.is_approved {
            profile.is_approved = v;
        }
    }

    pub fn require_complete(&self) -> AppResult<()> {
        require_fields(&[
            ("full_name", self.full_name.is_some()),
            ("national_id", self.national_id.is_some()),
            ("license_number", self.license_number.is_some()),
            ("is_approved", self.is_approved.is_some()),
        ])
    }
}

/// CreateVehicleRequest
///
/// `driver` is honoured only for Admin callers. A Driver always becomes the owner
/// of the vehicle they create, whatever the payload says.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateVehicleRequest {
    #[serde(default)]
    pub driver: Option<Uuid>,
    #[validate(length(min = 1, max = 20))]
    pub plate_number: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 50))]
    pub vehicle_type: Option<String>,
    #[validate(range(min = 1))]
    pub capacity: i32,
    #[validate(length(min = 1, max = 50))]
    pub color: String,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// VehicleChanges
///
/// The mutable attributes of a vehicle. The owner is not among them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct VehicleChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 20))]
    pub plate_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50))]
    pub vehicle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 50))]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl VehicleChanges {
    pub fn apply_to(&self, vehicle: &mut Vehicle) {
        if let Some(v) = &self.plate_number {
            vehicle.plate_number = v.clone();
        }
        if let Some(v) = &self.vehicle_type {
            vehicle.vehicle_type = v.clone();
        }
        if let Some(v) = self.capacity {
            vehicle.capacity = v;
        }
        if let Some(v) = &self.color {
            vehicle.color = v.clone();
        }
        if let Some(v) = self.is_active {
            vehicle.is_active = v;
        }
    }

    pub fn require_complete(&self) -> AppResult<()> {
        require_fields(&[
            ("plate_number", self.plate_number.is_some()),
            ("vehicle_type", self.vehicle_type.is_some()),
            ("capacity", self.capacity.is_some()),
            ("color", self.color.is_some()),
            ("is_active", self.is_active.is_some()),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateRouteRequest {
    #[validate(length(min = 1, max = 100))]
    pub start_point: String,
    #[validate(length(min = 1, max = 100))]
    pub end_point: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub distance: Option<Decimal>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// RouteChanges
///
/// `distance` distinguishes "absent" (outer `None`) from "cleared" (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct RouteChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100))]
    pub start_point: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100))]
    pub end_point: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub distance: Option<Option<Decimal>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl RouteChanges {
    /// Applies the changes and returns the names of the fields whose value changed.
    pub fn apply_to(&self, route: &mut Route) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(v) = &self.start_point {
            if route.start_point != *v {
                route.start_point = v.clone();
                changed.push("start_point");
            }
        }
        if let Some(v) = &self.end_point {
            if route.end_point != *v {
                route.end_point = v.clone();
                changed.push("end_point");
            }
        }
        if let Some(v) = self.distance {
            if route.distance != v {
                route.distance = v;
                changed.push("distance");
            }
        }
        if let Some(v) = self.is_active {
            if route.is_active != v {
                route.is_active = v;
                changed.push("is_active");
            }
        }
        changed
    }

    pub fn require_complete(&self) -> AppResult<()> {
        require_fields(&[
            ("start_point", self.start_point.is_some()),
            ("end_point", self.end_point.is_some()),
            ("distance", self.distance.is_some()),
            ("is_active", self.is_active.is_some()),
        ])
    }
}

/// DaysOfWeek
///
/// Accepts either a JSON list (`["Mon", "Tue"]`) or a comma separated string
/// (`"Mon, Tue"`). Tokens are checked and normalized by `normalized()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "DaysInput")]
pub struct DaysOfWeek(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum DaysInput {
    List(Vec<String>),
    Csv(String),
}

impl From<DaysInput> for DaysOfWeek {
    fn from(input: DaysInput) -> Self {
        match input {
            DaysInput::List(days) => DaysOfWeek(days),
            DaysInput::Csv(raw) => DaysOfWeek(
                raw.split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }
}

pub const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

impl DaysOfWeek {
    /// Canonical three-letter tokens, de-duplicated in input order.
    /// A token must be the abbreviation or the full day name, in any case.
    pub fn normalized(&self) -> AppResult<Vec<String>> {
        let mut days: Vec<String> = Vec::new();
        for raw in &self.0 {
            let token = raw.trim();
            let day = WEEKDAYS
                .iter()
                .zip(WEEKDAY_NAMES)
                .find(|(short, long)| {
                    token.eq_ignore_ascii_case(short) || token.eq_ignore_ascii_case(long)
                })
                .map(|(short, _)| short)
                .ok_or_else(|| {
                    AppError::Validation(format!("'{}' is not a weekday", token))
                })?;
            if !days.iter().any(|d| d == day) {
                days.push(day.to_string());
            }
        }
        if days.is_empty() {
            return Err(AppError::Validation("days_of_week must not be empty".to_string()));
        }
        Ok(days)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateScheduleRequest {
    pub vehicle: Uuid,
    pub route: Uuid,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "07:30:00")]
    pub arrival_start_time: NaiveTime,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "09:00:00")]
    pub arrival_end_time: NaiveTime,
    #[ts(type = "string[] | string")]
    #[schema(value_type = Vec<String>)]
    pub days_of_week: DaysOfWeek,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// ScheduleChanges
///
/// The mutable attributes of a schedule; vehicle and route are fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ScheduleChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub arrival_start_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    #[schema(value_type = Option<String>)]
    pub arrival_end_time: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string[] | string | null")]
    #[schema(value_type = Option<Vec<String>>)]
    pub days_of_week: Option<DaysOfWeek>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ScheduleChanges {
    pub fn apply_to(&self, schedule: &mut Schedule) -> AppResult<()> {
        if let Some(v) = self.arrival_start_time {
            schedule.arrival_start_time = v;
        }
        if let Some(v) = self.arrival_end_time {
            schedule.arrival_end_time = v;
        }
        if let Some(days) = &self.days_of_week {
            schedule.days_of_week = days.normalized()?;
        }
        if let Some(v) = self.is_active {
            schedule.is_active = v;
        }
        schedule.check()
    }

    pub fn require_complete(&self) -> AppResult<()> {
        require_fields(&[
            ("arrival_start_time", self.arrival_start_time.is_some()),
            ("arrival_end_time", self.arrival_end_time.is_some()),
            ("days_of_week", self.days_of_week.is_some()),
            ("is_active", self.is_active.is_some()),
        ])
    }
}

// --- Dashboard Schemas (Output) ---

/// AdminStats
///
/// GET /stats for an Admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminStats {
    pub total_users: i64,
    pub active_vehicles: i64,
    pub total_routes: i64,
    /// DriverProfiles with `is_approved = false`.
    pub pending_drivers: i64,
}

/// DriverStats
///
/// GET /stats for a Driver with a linked profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DriverStats {
    pub total_trips: i64,
    /// Plate of the first active vehicle, or the literal "None".
    pub active_vehicle: String,
    pub rating: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum Stats {
    Admin(AdminStats),
    Driver(DriverStats),
}

// --- Shared validation helpers ---

fn require_fields(fields: &[(&str, bool)]) -> AppResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Full update requires: {}",
            missing.join(", ")
        )))
    }
}

fn check_non_blank(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be blank", field)));
    }
    Ok(())
}

/// NUMERIC(5, 2): non-negative, below 1000, at most two decimal places.
pub fn check_distance(distance: Decimal) -> AppResult<()> {
    if distance.is_sign_negative() && !distance.is_zero() {
        return Err(AppError::Validation("distance must not be negative".to_string()));
    }
    if distance >= Decimal::from(1000) || distance.normalize().scale() > 2 {
        return Err(AppError::Validation(
            "distance allows at most 5 digits with 2 decimal places".to_string(),
        ));
    }
    Ok(())
}

pub fn check_time_window(start: NaiveTime, end: NaiveTime) -> AppResult<()> {
    if start > end {
        return Err(AppError::Validation(
            "arrival_start_time must not be after arrival_end_time".to_string(),
        ));
    }
    Ok(())
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
