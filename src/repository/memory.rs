use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use uuid::Uuid;

use super::{NewDriver, NewPassenger, NewRoute, NewSchedule, NewVehicle, Repository};
use crate::{
    audit::{Actor, AuditEntry},
    error::{AppError, AppResult},
    models::{
        AdminStats, Credentials, DriverChanges, DriverProfile, PassengerProfile, Role, Route,
        RouteChanges, Schedule, ScheduleChanges, SystemLog, User, Vehicle, VehicleChanges,
    },
    policy::Visibility,
};

// --- Raw rows (foreign keys only; joined fields are projected on read) ---

#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    password_hash: String,
}

#[derive(Debug, Clone)]
struct DriverRow {
    id: Uuid,
    user_id: Uuid,
    full_name: String,
    national_id: String,
    license_number: String,
    is_approved: bool,
}

#[derive(Debug, Clone)]
struct VehicleRow {
    id: Uuid,
    driver_id: Uuid,
    plate_number: String,
    vehicle_type: String,
    capacity: i32,
    color: String,
    is_active: bool,
}

#[derive(Debug, Clone)]
struct ScheduleRow {
    id: Uuid,
    vehicle_id: Uuid,
    route_id: Uuid,
    arrival_start_time: NaiveTime,
    arrival_end_time: NaiveTime,
    days_of_week: Vec<String>,
    is_active: bool,
}

/// Every table behind one lock. Vectors keep insertion order.
#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserRow>,
    drivers: Vec<DriverRow>,
    passengers: Vec<PassengerProfile>,
    vehicles: Vec<VehicleRow>,
    routes: Vec<Route>,
    schedules: Vec<ScheduleRow>,
    logs: Vec<SystemLog>,
    next_log_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// MemoryRepository
///
/// An in-process implementation of `Repository` used by the test suites and for
/// running the API without a database. A single mutex guards all tables and the
/// audit log, so a mutation and its audit entry are one atomic step, and
/// concurrent creates with the same unique key produce exactly one winner.
///
/// Uniqueness, cascade and validation messages match what the Postgres
/// implementation reports.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    /// When true, every audit append fails and the surrounding mutation is discarded.
    fail_audit: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose audit log rejects every append.
    pub fn new_failing() -> Self {
        let repo = Self::default();
        repo.set_audit_failure(true);
        repo
    }

    pub fn set_audit_failure(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    /// Appends `entry` or fails without touching the log. Mutations call this
    /// before writing so a failure leaves the tables unchanged.
    fn append(&self, t: &mut Tables, entry: AuditEntry) -> AppResult<SystemLog> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(AppError::audit("simulated audit store failure"));
        }

        // Strictly increasing, so newest-first never depends on the id tiebreak
        // unless the clock goes backwards.
        let now = Utc::now();
        let timestamp = match t.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        t.last_timestamp = Some(timestamp);
        t.next_log_id += 1;

        let log = SystemLog {
            id: t.next_log_id,
            user: entry.user,
            username: entry.user.and_then(|id| t.username_of(id)),
            action: entry.action,
            resource: entry.resource,
            details: entry.details,
            timestamp,
        };
        t.logs.push(log.clone());
        tracing::info!(
            log_id = log.id,
            action = ?log.action,
            resource = %log.resource,
            "audit entry recorded"
        );
        Ok(log)
    }
}

fn duplicate(field: &str) -> AppError {
    AppError::Validation(format!("A record with this {} already exists", field))
}

fn missing_reference() -> AppError {
    AppError::Validation("Referenced record does not exist".to_string())
}

impl Tables {
    fn username_of(&self, user_id: Uuid) -> Option<String> {
        self.users
            .iter()
            .find(|u| u.user.id == user_id)
            .map(|u| u.user.username.clone())
    }

    /// The username is joined at read time, so a deleted identity reads back as null.
    fn resolved_log(&self, log: &SystemLog) -> SystemLog {
        let mut log = log.clone();
        log.username = log.user.and_then(|id| self.username_of(id));
        log
    }

    fn check_username(&self, username: &str) -> AppResult<()> {
        if self.users.iter().any(|u| u.user.username == username) {
            return Err(duplicate("username"));
        }
        Ok(())
    }

    /// `except` is the profile being updated, if any.
    fn check_driver_keys(&self, national_id: &str, license_number: &str, except: Option<Uuid>) -> AppResult<()> {
        let others = || self.drivers.iter().filter(move |d| Some(d.id) != except);
        if others().any(|d| d.national_id == national_id) {
            return Err(duplicate("national_id"));
        }
        if others().any(|d| d.license_number == license_number) {
            return Err(duplicate("license_number"));
        }
        Ok(())
    }

    fn check_plate(&self, plate: &str, except: Option<Uuid>) -> AppResult<()> {
        if self
            .vehicles
            .iter()
            .any(|v| v.plate_number == plate && Some(v.id) != except)
        {
            return Err(duplicate("plate_number"));
        }
        Ok(())
    }

    fn insert_user(&mut self, username: &str, email: Option<String>, phone: Option<String>, role: Role, password_hash: String) -> Uuid {
        let id = Uuid::new_v4();
        self.users.push(UserRow {
            user: User {
                id,
                username: username.to_string(),
                email,
                phone,
                role,
            },
            password_hash,
        });
        id
    }

    // --- Projections ---

    fn driver(&self, row: &DriverRow) -> DriverProfile {
        DriverProfile {
            id: row.id,
            user_id: row.user_id,
            username: self.username_of(row.user_id).unwrap_or_default(),
            full_name: row.full_name.clone(),
            national_id: row.national_id.clone(),
            license_number: row.license_number.clone(),
            is_approved: row.is_approved,
        }
    }

    fn vehicle(&self, row: &VehicleRow) -> Option<Vehicle> {
        let owner = self.drivers.iter().find(|d| d.id == row.driver_id)?;
        Some(Vehicle {
            id: row.id,
            driver: row.driver_id,
            driver_name: owner.full_name.clone(),
            owner_user_id: owner.user_id,
            plate_number: row.plate_number.clone(),
            vehicle_type: row.vehicle_type.clone(),
            capacity: row.capacity,
            color: row.color.clone(),
            is_active: row.is_active,
        })
    }

    fn schedule(&self, row: &ScheduleRow) -> Option<Schedule> {
        let vehicle = self.vehicles.iter().find(|v| v.id == row.vehicle_id)?;
        let owner = self.drivers.iter().find(|d| d.id == vehicle.driver_id)?;
        let route = self.routes.iter().find(|r| r.id == row.route_id)?;
        Some(Schedule {
            id: row.id,
            vehicle: row.vehicle_id,
            route: row.route_id,
            vehicle_plate: vehicle.plate_number.clone(),
            route_label: route.display(),
            owner_user_id: owner.user_id,
            arrival_start_time: row.arrival_start_time,
            arrival_end_time: row.arrival_end_time,
            days_of_week: row.days_of_week.clone(),
            is_active: row.is_active,
        })
    }

    fn driver_index(&self, id: Uuid) -> AppResult<usize> {
        self.drivers
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| AppError::not_found("Driver profile"))
    }

    fn vehicle_index(&self, id: Uuid) -> AppResult<usize> {
        self.vehicles
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| AppError::not_found("Vehicle"))
    }

    fn route_index(&self, id: Uuid) -> AppResult<usize> {
        self.routes
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| AppError::not_found("Route"))
    }

    fn schedule_index(&self, id: Uuid) -> AppResult<usize> {
        self.schedules
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| AppError::not_found("Schedule"))
    }

    fn projected_vehicle(&self, idx: usize) -> AppResult<Vehicle> {
        self.vehicle(&self.vehicles[idx])
            .ok_or_else(|| AppError::Internal("vehicle without owning profile".to_string()))
    }

    fn projected_schedule(&self, idx: usize) -> AppResult<Schedule> {
        self.schedule(&self.schedules[idx])
            .ok_or_else(|| AppError::Internal("schedule with dangling reference".to_string()))
    }

    // --- Cascades (ON DELETE CASCADE equivalents) ---

    fn cascade_vehicle(&mut self, vehicle_id: Uuid) {
        self.schedules.retain(|s| s.vehicle_id != vehicle_id);
    }

    fn cascade_driver(&mut self, driver_id: Uuid) {
        let owned: Vec<Uuid> = self
            .vehicles
            .iter()
            .filter(|v| v.driver_id == driver_id)
            .map(|v| v.id)
            .collect();
        for vehicle_id in &owned {
            self.cascade_vehicle(*vehicle_id);
        }
        self.vehicles.retain(|v| v.driver_id != driver_id);
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    // --- IDENTITIES ---

    async fn get_identity(&self, id: Uuid) -> AppResult<Option<User>> {
        let t = self.lock()?;
        Ok(t.users.iter().find(|u| u.user.id == id).map(|u| u.user.clone()))
    }

    async fn find_credentials(&self, username: &str) -> AppResult<Option<Credentials>> {
        let t = self.lock()?;
        Ok(t.users
            .iter()
            .find(|u| u.user.username == username)
            .map(|u| Credentials {
                id: u.user.id,
                username: u.user.username.clone(),
                role: u.user.role,
                password_hash: u.password_hash.clone(),
            }))
    }

    async fn register_driver(&self, new: NewDriver) -> AppResult<DriverProfile> {
        let mut t = self.lock()?;
        t.check_username(&new.username)?;
        t.check_driver_keys(&new.national_id, &new.license_number, None)?;

        // The identity goes in first so the audit entry can resolve its username.
        let user_id = t.insert_user(&new.username, new.email, new.phone, Role::Driver, new.password_hash);
        let row = DriverRow {
            id: Uuid::new_v4(),
            user_id,
            full_name: new.full_name,
            national_id: new.national_id,
            license_number: new.license_number,
            is_approved: false,
        };
        let profile = t.driver(&row);

        if let Err(e) = self.append(&mut t, AuditEntry::driver_registered(&profile)) {
            t.users.retain(|u| u.user.id != user_id);
            return Err(e);
        }
        t.drivers.push(row);
        Ok(profile)
    }

    async fn register_passenger(&self, new: NewPassenger) -> AppResult<PassengerProfile> {
        let mut t = self.lock()?;
        t.check_username(&new.username)?;

        let user_id = t.insert_user(&new.username, new.email, new.phone, Role::Passenger, new.password_hash);
        let profile = PassengerProfile {
            id: Uuid::new_v4(),
            user_id,
            username: new.username.clone(),
            full_name: new.full_name.clone(),
        };

        if let Err(e) = self.append(&mut t, AuditEntry::passenger_registered(&profile)) {
            t.users.retain(|u| u.user.id != user_id);
            return Err(e);
        }
        t.passengers.push(profile.clone());
        Ok(profile)
    }

    async fn ensure_admin(&self, username: &str, password_hash: String) -> AppResult<bool> {
        let mut t = self.lock()?;
        if t.users.iter().any(|u| u.user.username == username) {
            return Ok(false);
        }
        self.append(&mut t, AuditEntry::admin_bootstrapped(username))?;
        t.insert_user(username, None, None, Role::Admin, password_hash);
        Ok(true)
    }

    // --- DRIVER PROFILES ---

    async fn list_drivers(&self) -> AppResult<Vec<DriverProfile>> {
        let t = self.lock()?;
        Ok(t.drivers.iter().map(|d| t.driver(d)).collect())
    }

    async fn get_driver(&self, id: Uuid) -> AppResult<DriverProfile> {
        let t = self.lock()?;
        let idx = t.driver_index(id)?;
        Ok(t.driver(&t.drivers[idx]))
    }

    async fn driver_profile_for(&self, user_id: Uuid) -> AppResult<Option<DriverProfile>> {
        let t = self.lock()?;
        Ok(t.drivers
            .iter()
            .find(|d| d.user_id == user_id)
            .map(|d| t.driver(d)))
    }

    async fn update_driver(&self, actor: &Actor, id: Uuid, changes: DriverChanges) -> AppResult<DriverProfile> {
        let mut t = self.lock()?;
        let idx = t.driver_index(id)?;
        let mut profile = t.driver(&t.drivers[idx]);
        changes.apply_to(&mut profile);
        t.check_driver_keys(&profile.national_id, &profile.license_number, Some(id))?;

        let entry = AuditEntry::driver_updated(actor, &profile, changes.is_approved.is_some());
        self.append(&mut t, entry)?;

        let row = &mut t.drivers[idx];
        row.full_name = profile.full_name.clone();
        row.national_id = profile.national_id.clone();
        row.license_number = profile.license_number.clone();
        row.is_approved = profile.is_approved;
        Ok(profile)
    }

    async fn delete_driver(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut t = self.lock()?;
        let idx = t.driver_index(id)?;
        let profile = t.driver(&t.drivers[idx]);

        self.append(&mut t, AuditEntry::driver_deleted(actor, &profile))?;
        t.cascade_driver(id);
        t.drivers.remove(idx);
        Ok(())
    }

    // --- VEHICLES ---

    async fn list_vehicles(&self, visibility: Visibility) -> AppResult<Vec<Vehicle>> {
        let t = self.lock()?;
        Ok(t.vehicles
            .iter()
            .filter_map(|v| t.vehicle(v))
            .filter(|v| visibility.admits(Some(v.owner_user_id), v.is_active))
            .collect())
    }

    async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle> {
        let t = self.lock()?;
        let idx = t.vehicle_index(id)?;
        t.projected_vehicle(idx)
    }

    async fn create_vehicle(&self, actor: &Actor, new: NewVehicle) -> AppResult<Vehicle> {
        let mut t = self.lock()?;
        if !t.drivers.iter().any(|d| d.id == new.driver) {
            return Err(missing_reference());
        }
        t.check_plate(&new.plate_number, None)?;

        let row = VehicleRow {
            id: Uuid::new_v4(),
            driver_id: new.driver,
            plate_number: new.plate_number,
            vehicle_type: new.vehicle_type,
            capacity: new.capacity,
            color: new.color,
            is_active: new.is_active,
        };
        let vehicle = t
            .vehicle(&row)
            .ok_or_else(missing_reference)?;

        self.append(&mut t, AuditEntry::vehicle_created(actor, &vehicle))?;
        t.vehicles.push(row);
        Ok(vehicle)
    }

    async fn update_vehicle(&self, actor: &Actor, id: Uuid, changes: VehicleChanges) -> AppResult<Vehicle> {
        let mut t = self.lock()?;
        let idx = t.vehicle_index(id)?;
        let mut vehicle = t.projected_vehicle(idx)?;
        changes.apply_to(&mut vehicle);
        t.check_plate(&vehicle.plate_number, Some(id))?;

        self.append(&mut t, AuditEntry::vehicle_updated(actor, &vehicle))?;

        let row = &mut t.vehicles[idx];
        row.plate_number = vehicle.plate_number.clone();
        row.vehicle_type = vehicle.vehicle_type.clone();
        row.capacity = vehicle.capacity;
        row.color = vehicle.color.clone();
        row.is_active = vehicle.is_active;
        Ok(vehicle)
    }

    async fn delete_vehicle(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut t = self.lock()?;
        let idx = t.vehicle_index(id)?;
        let vehicle = t.projected_vehicle(idx)?;

        self.append(&mut t, AuditEntry::vehicle_deleted(actor, &vehicle))?;
        t.cascade_vehicle(id);
        t.vehicles.remove(idx);
        Ok(())
    }

    // --- ROUTES ---

    async fn list_routes(&self) -> AppResult<Vec<Route>> {
        Ok(self.lock()?.routes.clone())
    }

    async fn get_route(&self, id: Uuid) -> AppResult<Route> {
        let t = self.lock()?;
        let idx = t.route_index(id)?;
        Ok(t.routes[idx].clone())
    }

    async fn create_route(&self, actor: &Actor, new: NewRoute) -> AppResult<Route> {
        let route = Route {
            id: Uuid::new_v4(),
            start_point: new.start_point,
            end_point: new.end_point,
            distance: new.distance,
            is_active: new.is_active,
        };
        route.check()?;

        let mut t = self.lock()?;
        self.append(&mut t, AuditEntry::route_created(actor, &route))?;
        t.routes.push(route.clone());
        Ok(route)
    }

    async fn update_route(&self, actor: &Actor, id: Uuid, changes: RouteChanges) -> AppResult<Route> {
        let mut t = self.lock()?;
        let idx = t.route_index(id)?;
        let mut route = t.routes[idx].clone();
        let changed = changes.apply_to(&mut route);
        route.check()?;

        self.append(&mut t, AuditEntry::route_updated(actor, &route, &changed))?;
        t.routes[idx] = route.clone();
        Ok(route)
    }

    async fn delete_route(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut t = self.lock()?;
        let idx = t.route_index(id)?;
        let route = t.routes[idx].clone();

        self.append(&mut t, AuditEntry::route_deleted(actor, &route))?;
        t.schedules.retain(|s| s.route_id != id);
        t.routes.remove(idx);
        Ok(())
    }

    // --- SCHEDULES ---

    async fn list_schedules(&self, visibility: Visibility) -> AppResult<Vec<Schedule>> {
        let t = self.lock()?;
        Ok(t.schedules
            .iter()
            .filter_map(|s| t.schedule(s))
            .filter(|s| visibility.admits(Some(s.owner_user_id), s.is_active))
            .collect())
    }

    async fn get_schedule(&self, id: Uuid) -> AppResult<Schedule> {
        let t = self.lock()?;
        let idx = t.schedule_index(id)?;
        t.projected_schedule(idx)
    }

    async fn create_schedule(&self, actor: &Actor, new: NewSchedule) -> AppResult<Schedule> {
        let mut t = self.lock()?;
        let row = ScheduleRow {
            id: Uuid::new_v4(),
            vehicle_id: new.vehicle,
            route_id: new.route,
            arrival_start_time: new.arrival_start_time,
            arrival_end_time: new.arrival_end_time,
            days_of_week: new.days_of_week,
            is_active: new.is_active,
        };
        let schedule = t.schedule(&row).ok_or_else(missing_reference)?;
        schedule.check()?;

        self.append(&mut t, AuditEntry::schedule_created(actor, &schedule))?;
        t.schedules.push(row);
        Ok(schedule)
    }

    async fn update_schedule(&self, actor: &Actor, id: Uuid, changes: ScheduleChanges) -> AppResult<Schedule> {
        let mut t = self.lock()?;
        let idx = t.schedule_index(id)?;
        let mut schedule = t.projected_schedule(idx)?;
        changes.apply_to(&mut schedule)?;

        self.append(&mut t, AuditEntry::schedule_updated(actor, &schedule))?;

        let row = &mut t.schedules[idx];
        row.arrival_start_time = schedule.arrival_start_time;
        row.arrival_end_time = schedule.arrival_end_time;
        row.days_of_week = schedule.days_of_week.clone();
        row.is_active = schedule.is_active;
        Ok(schedule)
    }

    async fn delete_schedule(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut t = self.lock()?;
        let idx = t.schedule_index(id)?;
        let schedule = t.projected_schedule(idx)?;

        self.append(&mut t, AuditEntry::schedule_deleted(actor, &schedule))?;
        t.schedules.remove(idx);
        Ok(())
    }

    // --- AUDIT TRAIL ---

    async fn list_logs(&self) -> AppResult<Vec<SystemLog>> {
        let t = self.lock()?;
        let mut logs: Vec<SystemLog> = t.logs.iter().map(|log| t.resolved_log(log)).collect();
        logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(logs)
    }

    async fn get_log(&self, id: i64) -> AppResult<SystemLog> {
        let t = self.lock()?;
        t.logs
            .iter()
            .find(|l| l.id == id)
            .map(|log| t.resolved_log(log))
            .ok_or_else(|| AppError::not_found("Log entry"))
    }

    // --- STATS ---

    async fn admin_stats(&self) -> AppResult<AdminStats> {
        let t = self.lock()?;
        Ok(AdminStats {
            total_users: t.users.len() as i64,
            active_vehicles: t.vehicles.iter().filter(|v| v.is_active).count() as i64,
            total_routes: t.routes.len() as i64,
            pending_drivers: t.drivers.iter().filter(|d| !d.is_approved).count() as i64,
        })
    }

    async fn count_driver_schedules(&self, driver_profile: Uuid) -> AppResult<i64> {
        let t = self.lock()?;
        let count = t
            .schedules
            .iter()
            .filter(|s| {
                t.vehicles
                    .iter()
                    .any(|v| v.id == s.vehicle_id && v.driver_id == driver_profile)
            })
            .count();
        Ok(count as i64)
    }

    async fn first_active_plate(&self, driver_profile: Uuid) -> AppResult<Option<String>> {
        let t = self.lock()?;
        Ok(t.vehicles
            .iter()
            .find(|v| v.driver_id == driver_profile && v.is_active)
            .map(|v| v.plate_number.clone()))
    }
}
