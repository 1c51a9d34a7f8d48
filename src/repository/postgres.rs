use async_trait::async_trait;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder, types::Json};
use uuid::Uuid;

use super::{NewDriver, NewPassenger, NewRoute, NewSchedule, NewVehicle, Repository};
use crate::{
    audit::{self, Actor, AuditEntry},
    error::{AppError, AppResult},
    models::{
        AdminStats, Credentials, DriverChanges, DriverProfile, PassengerProfile, Role, Route,
        RouteChanges, Schedule, ScheduleChanges, SystemLog, User, Vehicle, VehicleChanges,
    },
    policy::Visibility,
};

// Shared projections. Joined, read-only columns are computed here so every
// read and every post-write re-read returns the same shape.

const DRIVER_SELECT: &str = r#"
    SELECT d.id, d.user_id, u.username, d.full_name, d.national_id,
           d.license_number, d.is_approved
    FROM driver_profiles d
    JOIN users u ON u.id = d.user_id
"#;

const VEHICLE_SELECT: &str = r#"
    SELECT v.id, v.driver_id AS driver, d.full_name AS driver_name,
           d.user_id AS owner_user_id, v.plate_number, v.vehicle_type,
           v.capacity, v.color, v.is_active
    FROM vehicles v
    JOIN driver_profiles d ON d.id = v.driver_id
"#;

const ROUTE_SELECT: &str = r#"
    SELECT r.id, r.start_point, r.end_point, r.distance, r.is_active
    FROM routes r
"#;

const SCHEDULE_SELECT: &str = r#"
    SELECT s.id, s.vehicle_id AS vehicle, s.route_id AS route,
           v.plate_number AS vehicle_plate,
           r.start_point || ' - ' || r.end_point AS route_label,
           d.user_id AS owner_user_id,
           s.arrival_start_time, s.arrival_end_time, s.days_of_week, s.is_active
    FROM schedules s
    JOIN vehicles v ON v.id = s.vehicle_id
    JOIN driver_profiles d ON d.id = v.driver_id
    JOIN routes r ON r.id = s.route_id
"#;

const LOG_SELECT: &str = r#"
    SELECT l.id, l.user_id AS "user", u.username, l.action, l.resource, l.details,
           l.created_at AS "timestamp"
    FROM system_logs l
    LEFT JOIN users u ON u.id = l.user_id
"#;

/// PostgresRepository
///
/// The production implementation of the `Repository` trait, backed by PostgreSQL.
/// Every mutation runs in a single transaction: the target row is locked, the
/// change is applied and checked in Rust, written back, and the audit entry is
/// appended on the same connection before commit. Dropping the transaction on
/// any `?` rolls all of it back.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the row filter for a visibility-scoped listing. `active_col` and
/// `owner_col` are the qualified columns of the base query.
fn push_visibility(
    builder: &mut QueryBuilder<'_, Postgres>,
    visibility: Visibility,
    active_col: &str,
    owner_col: &str,
) {
    match visibility {
        Visibility::All => {}
        Visibility::ActiveOnly => {
            builder.push(format!(" WHERE {} = true", active_col));
        }
        Visibility::OwnedBy(owner) => {
            builder.push(format!(" WHERE {} = ", owner_col));
            builder.push_bind(owner);
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- IDENTITIES ---

    async fn get_identity(&self, id: Uuid) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, phone, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_credentials(&self, username: &str) -> AppResult<Option<Credentials>> {
        let creds = sqlx::query_as::<_, Credentials>(
            "SELECT id, username, role, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(creds)
    }

    /// register_driver
    ///
    /// Identity, profile and the registration audit entry in one transaction. A
    /// taken username, national id or license number fails the whole thing.
    async fn register_driver(&self, new: NewDriver) -> AppResult<DriverProfile> {
        let mut tx = self.pool.begin().await?;
        let user_id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO users (id, username, email, phone, role, password_hash)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(user_id)
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(Role::Driver)
        .bind(&new.password_hash)
        .execute(&mut *tx)
        .await?;

        let profile_id = Uuid::new_v4();
        sqlx::query(
            r#"INSERT INTO driver_profiles (id, user_id, full_name, national_id, license_number)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(profile_id)
        .bind(user_id)
        .bind(&new.full_name)
        .bind(&new.national_id)
        .bind(&new.license_number)
        .execute(&mut *tx)
        .await?;

        let sql = format!("{} WHERE d.id = $1", DRIVER_SELECT);
        let profile = sqlx::query_as::<_, DriverProfile>(&sql)
            .bind(profile_id)
            .fetch_one(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::driver_registered(&profile))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn register_passenger(&self, new: NewPassenger) -> AppResult<PassengerProfile> {
        let mut tx = self.pool.begin().await?;
        let user_id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO users (id, username, email, phone, role, password_hash)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(user_id)
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(Role::Passenger)
        .bind(&new.password_hash)
        .execute(&mut *tx)
        .await?;

        // CTE so the joined username comes back with the insert.
        let profile = sqlx::query_as::<_, PassengerProfile>(
            r#"
            WITH inserted AS (
                INSERT INTO passenger_profiles (id, user_id, full_name)
                VALUES ($1, $2, $3)
                RETURNING id, user_id, full_name
            )
            SELECT i.id, i.user_id, u.username, i.full_name
            FROM inserted i JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.full_name)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(&mut *tx, &AuditEntry::passenger_registered(&profile))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(profile)
    }

    /// ensure_admin
    ///
    /// Idempotent: `ON CONFLICT DO NOTHING` on the username, and the audit entry
    /// is only written when a row was actually inserted.
    async fn ensure_admin(&self, username: &str, password_hash: String) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"INSERT INTO users (id, username, role, password_hash)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (username) DO NOTHING"#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(Role::Admin)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            audit::record(&mut *tx, &AuditEntry::admin_bootstrapped(username))
                .await
                .map_err(AppError::audit)?;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    // --- DRIVER PROFILES ---

    async fn list_drivers(&self) -> AppResult<Vec<DriverProfile>> {
        let sql = format!("{} ORDER BY d.created_at, d.id", DRIVER_SELECT);
        Ok(sqlx::query_as::<_, DriverProfile>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_driver(&self, id: Uuid) -> AppResult<DriverProfile> {
        let sql = format!("{} WHERE d.id = $1", DRIVER_SELECT);
        sqlx::query_as::<_, DriverProfile>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Driver profile"))
    }

    async fn driver_profile_for(&self, user_id: Uuid) -> AppResult<Option<DriverProfile>> {
        let sql = format!("{} WHERE d.user_id = $1", DRIVER_SELECT);
        Ok(sqlx::query_as::<_, DriverProfile>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_driver(&self, actor: &Actor, id: Uuid, changes: DriverChanges) -> AppResult<DriverProfile> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE d.id = $1 FOR UPDATE OF d", DRIVER_SELECT);
        let mut profile = sqlx::query_as::<_, DriverProfile>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Driver profile"))?;

        changes.apply_to(&mut profile);

        sqlx::query(
            r#"UPDATE driver_profiles
               SET full_name = $2, national_id = $3, license_number = $4, is_approved = $5
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&profile.full_name)
        .bind(&profile.national_id)
        .bind(&profile.license_number)
        .bind(profile.is_approved)
        .execute(&mut *tx)
        .await?;

        let entry = AuditEntry::driver_updated(actor, &profile, changes.is_approved.is_some());
        audit::record(&mut *tx, &entry).await.map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn delete_driver(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE d.id = $1 FOR UPDATE OF d", DRIVER_SELECT);
        let profile = sqlx::query_as::<_, DriverProfile>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Driver profile"))?;

        // Vehicles and their schedules go with the profile (ON DELETE CASCADE).
        sqlx::query("DELETE FROM driver_profiles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::driver_deleted(actor, &profile))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(())
    }

    // --- VEHICLES ---

    async fn list_vehicles(&self, visibility: Visibility) -> AppResult<Vec<Vehicle>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(VEHICLE_SELECT);
        push_visibility(&mut builder, visibility, "v.is_active", "d.user_id");
        builder.push(" ORDER BY v.created_at, v.id");
        Ok(builder.build_query_as::<Vehicle>().fetch_all(&self.pool).await?)
    }

    async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle> {
        let sql = format!("{} WHERE v.id = $1", VEHICLE_SELECT);
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Vehicle"))
    }

    /// create_vehicle
    ///
    /// An unknown owning profile surfaces as a foreign key violation, which the
    /// error mapping turns into a validation error.
    async fn create_vehicle(&self, actor: &Actor, new: NewVehicle) -> AppResult<Vehicle> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO vehicles (id, driver_id, plate_number, vehicle_type, capacity, color, is_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(id)
        .bind(new.driver)
        .bind(&new.plate_number)
        .bind(&new.vehicle_type)
        .bind(new.capacity)
        .bind(&new.color)
        .bind(new.is_active)
        .execute(&mut *tx)
        .await?;

        let sql = format!("{} WHERE v.id = $1", VEHICLE_SELECT);
        let vehicle = sqlx::query_as::<_, Vehicle>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::vehicle_created(actor, &vehicle))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(vehicle)
    }

    async fn update_vehicle(&self, actor: &Actor, id: Uuid, changes: VehicleChanges) -> AppResult<Vehicle> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE v.id = $1 FOR UPDATE OF v", VEHICLE_SELECT);
        let mut vehicle = sqlx::query_as::<_, Vehicle>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Vehicle"))?;

        changes.apply_to(&mut vehicle);

        // driver_id is never written: ownership does not move.
        sqlx::query(
            r#"UPDATE vehicles
               SET plate_number = $2, vehicle_type = $3, capacity = $4, color = $5, is_active = $6
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&vehicle.plate_number)
        .bind(&vehicle.vehicle_type)
        .bind(vehicle.capacity)
        .bind(&vehicle.color)
        .bind(vehicle.is_active)
        .execute(&mut *tx)
        .await?;

        audit::record(&mut *tx, &AuditEntry::vehicle_updated(actor, &vehicle))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(vehicle)
    }

    async fn delete_vehicle(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE v.id = $1 FOR UPDATE OF v", VEHICLE_SELECT);
        let vehicle = sqlx::query_as::<_, Vehicle>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Vehicle"))?;

        sqlx::query("DELETE FROM vehicles WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::vehicle_deleted(actor, &vehicle))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(())
    }

    // --- ROUTES ---

    async fn list_routes(&self) -> AppResult<Vec<Route>> {
        let sql = format!("{} ORDER BY r.created_at, r.id", ROUTE_SELECT);
        Ok(sqlx::query_as::<_, Route>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_route(&self, id: Uuid) -> AppResult<Route> {
        let sql = format!("{} WHERE r.id = $1", ROUTE_SELECT);
        sqlx::query_as::<_, Route>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Route"))
    }

    async fn create_route(&self, actor: &Actor, new: NewRoute) -> AppResult<Route> {
        let candidate = Route {
            id: Uuid::new_v4(),
            start_point: new.start_point,
            end_point: new.end_point,
            distance: new.distance,
            is_active: new.is_active,
        };
        candidate.check()?;

        let mut tx = self.pool.begin().await?;
        let route = sqlx::query_as::<_, Route>(
            r#"INSERT INTO routes (id, start_point, end_point, distance, is_active)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, start_point, end_point, distance, is_active"#,
        )
        .bind(candidate.id)
        .bind(&candidate.start_point)
        .bind(&candidate.end_point)
        .bind(candidate.distance)
        .bind(candidate.is_active)
        .fetch_one(&mut *tx)
        .await?;

        audit::record(&mut *tx, &AuditEntry::route_created(actor, &route))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(route)
    }

    async fn update_route(&self, actor: &Actor, id: Uuid, changes: RouteChanges) -> AppResult<Route> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE r.id = $1 FOR UPDATE", ROUTE_SELECT);
        let mut route = sqlx::query_as::<_, Route>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Route"))?;

        let changed = changes.apply_to(&mut route);
        route.check()?;

        sqlx::query(
            r#"UPDATE routes
               SET start_point = $2, end_point = $3, distance = $4, is_active = $5
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&route.start_point)
        .bind(&route.end_point)
        .bind(route.distance)
        .bind(route.is_active)
        .execute(&mut *tx)
        .await?;

        audit::record(&mut *tx, &AuditEntry::route_updated(actor, &route, &changed))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(route)
    }

    async fn delete_route(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE r.id = $1 FOR UPDATE", ROUTE_SELECT);
        let route = sqlx::query_as::<_, Route>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Route"))?;

        sqlx::query("DELETE FROM routes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::route_deleted(actor, &route))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(())
    }

    // --- SCHEDULES ---

    async fn list_schedules(&self, visibility: Visibility) -> AppResult<Vec<Schedule>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(SCHEDULE_SELECT);
        push_visibility(&mut builder, visibility, "s.is_active", "d.user_id");
        builder.push(" ORDER BY s.created_at, s.id");
        Ok(builder.build_query_as::<Schedule>().fetch_all(&self.pool).await?)
    }

    async fn get_schedule(&self, id: Uuid) -> AppResult<Schedule> {
        let sql = format!("{} WHERE s.id = $1", SCHEDULE_SELECT);
        sqlx::query_as::<_, Schedule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Schedule"))
    }

    async fn create_schedule(&self, actor: &Actor, new: NewSchedule) -> AppResult<Schedule> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO schedules
                   (id, vehicle_id, route_id, arrival_start_time, arrival_end_time, days_of_week, is_active)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(id)
        .bind(new.vehicle)
        .bind(new.route)
        .bind(new.arrival_start_time)
        .bind(new.arrival_end_time)
        .bind(Json(&new.days_of_week))
        .bind(new.is_active)
        .execute(&mut *tx)
        .await?;

        let sql = format!("{} WHERE s.id = $1", SCHEDULE_SELECT);
        let schedule = sqlx::query_as::<_, Schedule>(&sql)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::schedule_created(actor, &schedule))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(schedule)
    }

    async fn update_schedule(&self, actor: &Actor, id: Uuid, changes: ScheduleChanges) -> AppResult<Schedule> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE s.id = $1 FOR UPDATE OF s", SCHEDULE_SELECT);
        let mut schedule = sqlx::query_as::<_, Schedule>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Schedule"))?;

        changes.apply_to(&mut schedule)?;

        sqlx::query(
            r#"UPDATE schedules
               SET arrival_start_time = $2, arrival_end_time = $3, days_of_week = $4, is_active = $5
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(schedule.arrival_start_time)
        .bind(schedule.arrival_end_time)
        .bind(Json(&schedule.days_of_week))
        .bind(schedule.is_active)
        .execute(&mut *tx)
        .await?;

        audit::record(&mut *tx, &AuditEntry::schedule_updated(actor, &schedule))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(schedule)
    }

    async fn delete_schedule(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("{} WHERE s.id = $1 FOR UPDATE OF s", SCHEDULE_SELECT);
        let schedule = sqlx::query_as::<_, Schedule>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Schedule"))?;

        sqlx::query("DELETE FROM schedules WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        audit::record(&mut *tx, &AuditEntry::schedule_deleted(actor, &schedule))
            .await
            .map_err(AppError::audit)?;
        tx.commit().await?;
        Ok(())
    }

    // --- AUDIT TRAIL ---

    async fn list_logs(&self) -> AppResult<Vec<SystemLog>> {
        let sql = format!("{} ORDER BY l.created_at DESC, l.id DESC", LOG_SELECT);
        Ok(sqlx::query_as::<_, SystemLog>(&sql).fetch_all(&self.pool).await?)
    }

    async fn get_log(&self, id: i64) -> AppResult<SystemLog> {
        let sql = format!("{} WHERE l.id = $1", LOG_SELECT);
        sqlx::query_as::<_, SystemLog>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Log entry"))
    }

    // --- STATS ---

    /// admin_stats
    ///
    /// All four counters in one round trip.
    async fn admin_stats(&self) -> AppResult<AdminStats> {
        let stats = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM vehicles WHERE is_active = true),
                (SELECT COUNT(*) FROM routes),
                (SELECT COUNT(*) FROM driver_profiles WHERE is_approved = false)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminStats {
            total_users: stats.0,
            active_vehicles: stats.1,
            total_routes: stats.2,
            pending_drivers: stats.3,
        })
    }

    async fn count_driver_schedules(&self, driver_profile: Uuid) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM schedules s
               JOIN vehicles v ON v.id = s.vehicle_id
               WHERE v.driver_id = $1"#,
        )
        .bind(driver_profile)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn first_active_plate(&self, driver_profile: Uuid) -> AppResult<Option<String>> {
        let plate = sqlx::query_scalar::<_, String>(
            r#"SELECT plate_number FROM vehicles
               WHERE driver_id = $1 AND is_active = true
               ORDER BY created_at, id
               LIMIT 1"#,
        )
        .bind(driver_profile)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plate)
    }
}
