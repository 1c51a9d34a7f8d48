use async_trait::async_trait;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    audit::Actor,
    error::AppResult,
    models::{
        AdminStats, Credentials, DriverChanges, DriverProfile, PassengerProfile, Route,
        RouteChanges, Schedule, ScheduleChanges, SystemLog, User, Vehicle, VehicleChanges,
    },
    policy::Visibility,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

// --- Write models (already validated and authorized by the caller) ---

/// NewDriver
///
/// A driver registration with the password already hashed.
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: String,
    pub national_id: String,
    pub license_number: String,
}

#[derive(Debug, Clone)]
pub struct NewPassenger {
    pub username: String,
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: String,
}

/// NewVehicle
///
/// `driver` is the owning DriverProfile id, resolved by the handler from the
/// caller's role.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub driver: Uuid,
    pub plate_number: String,
    pub vehicle_type: String,
    pub capacity: i32,
    pub color: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewRoute {
    pub start_point: String,
    pub end_point: String,
    pub distance: Option<Decimal>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub vehicle: Uuid,
    pub route: Uuid,
    pub arrival_start_time: NaiveTime,
    pub arrival_end_time: NaiveTime,
    // Normalized weekday tokens.
    pub days_of_week: Vec<String>,
    pub is_active: bool,
}

/// Repository Trait
///
/// The resource store contract. Every mutating method receives the acting
/// identity and appends exactly one audit entry in the same transaction as the
/// write; if that append fails the write is rolled back and an `Internal` error
/// is returned. The audit trail itself is read-only through this trait.
///
/// Uniqueness (username, national_id, license_number, plate_number) is enforced
/// here and reported as `Validation`. Missing records are `NotFound`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identities ---
    async fn get_identity(&self, id: Uuid) -> AppResult<Option<User>>;
    // Login lookup; the only place a password hash leaves the store.
    async fn find_credentials(&self, username: &str) -> AppResult<Option<Credentials>>;
    async fn register_driver(&self, new: NewDriver) -> AppResult<DriverProfile>;
    async fn register_passenger(&self, new: NewPassenger) -> AppResult<PassengerProfile>;
    /// Creates the admin account unless the username is taken. Returns true if created.
    async fn ensure_admin(&self, username: &str, password_hash: String) -> AppResult<bool>;

    // --- Driver Profiles ---
    async fn list_drivers(&self) -> AppResult<Vec<DriverProfile>>;
    async fn get_driver(&self, id: Uuid) -> AppResult<DriverProfile>;
    async fn driver_profile_for(&self, user_id: Uuid) -> AppResult<Option<DriverProfile>>;
    async fn update_driver(&self, actor: &Actor, id: Uuid, changes: DriverChanges) -> AppResult<DriverProfile>;
    async fn delete_driver(&self, actor: &Actor, id: Uuid) -> AppResult<()>;

    // --- Vehicles ---
    async fn list_vehicles(&self, visibility: Visibility) -> AppResult<Vec<Vehicle>>;
    async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle>;
    async fn create_vehicle(&self, actor: &Actor, new: NewVehicle) -> AppResult<Vehicle>;
    async fn update_vehicle(&self, actor: &Actor, id: Uuid, changes: VehicleChanges) -> AppResult<Vehicle>;
    async fn delete_vehicle(&self, actor: &Actor, id: Uuid) -> AppResult<()>;

    // --- Routes ---
    async fn list_routes(&self) -> AppResult<Vec<Route>>;
    async fn get_route(&self, id: Uuid) -> AppResult<Route>;
    async fn create_route(&self, actor: &Actor, new: NewRoute) -> AppResult<Route>;
    async fn update_route(&self, actor: &Actor, id: Uuid, changes: RouteChanges) -> AppResult<Route>;
    async fn delete_route(&self, actor: &Actor, id: Uuid) -> AppResult<()>;

    // --- Schedules ---
    async fn list_schedules(&self, visibility: Visibility) -> AppResult<Vec<Schedule>>;
    async fn get_schedule(&self, id: Uuid) -> AppResult<Schedule>;
    async fn create_schedule(&self, actor: &Actor, new: NewSchedule) -> AppResult<Schedule>;
    async fn update_schedule(&self, actor: &Actor, id: Uuid, changes: ScheduleChanges) -> AppResult<Schedule>;
    async fn delete_schedule(&self, actor: &Actor, id: Uuid) -> AppResult<()>;

    // --- Audit Trail (read-only) ---
    /// Newest first.
    async fn list_logs(&self) -> AppResult<Vec<SystemLog>>;
    async fn get_log(&self, id: i64) -> AppResult<SystemLog>;

    // --- Stats Counters ---
    async fn admin_stats(&self) -> AppResult<AdminStats>;
    async fn count_driver_schedules(&self, driver_profile: Uuid) -> AppResult<i64>;
    /// Plate of the earliest-registered active vehicle of the profile.
    async fn first_active_plate(&self, driver_profile: Uuid) -> AppResult<Option<String>>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
