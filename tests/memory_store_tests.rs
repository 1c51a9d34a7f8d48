use chrono::NaiveTime;
use fleet_admin::{
    AppError, MemoryRepository,
    audit::Actor,
    models::{AuditAction, DaysOfWeek, DriverChanges, Role, RouteChanges, ScheduleChanges, VehicleChanges},
    policy::Visibility,
    repository::{NewDriver, NewRoute, NewSchedule, NewVehicle, Repository},
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Fixtures ---

fn new_driver(username: &str, national_id: &str, license: &str) -> NewDriver {
    NewDriver {
        username: username.to_string(),
        password_hash: "hash".to_string(),
        email: None,
        phone: None,
        full_name: format!("{} Full", username),
        national_id: national_id.to_string(),
        license_number: license.to_string(),
    }
}

fn new_vehicle(driver: Uuid, plate: &str, is_active: bool) -> NewVehicle {
    NewVehicle {
        driver,
        plate_number: plate.to_string(),
        vehicle_type: "Daladala".to_string(),
        capacity: 30,
        color: "Blue".to_string(),
        is_active,
    }
}

fn new_route(start: &str, end: &str) -> NewRoute {
    NewRoute {
        start_point: start.to_string(),
        end_point: end.to_string(),
        distance: Some(Decimal::new(1250, 2)),
        is_active: true,
    }
}

fn new_schedule(vehicle: Uuid, route: Uuid, is_active: bool) -> NewSchedule {
    NewSchedule {
        vehicle,
        route,
        arrival_start_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        arrival_end_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        days_of_week: vec!["Mon".to_string(), "Tue".to_string()],
        is_active,
    }
}

fn admin_actor() -> Actor {
    Actor::user(Uuid::new_v4(), Role::Admin)
}

// --- Uniqueness ---

#[test]
async fn test_duplicate_username_is_a_validation_error() {
    let repo = MemoryRepository::new();
    repo.register_driver(new_driver("juma", "N1", "L1")).await.unwrap();

    let err = repo
        .register_driver(new_driver("juma", "N2", "L2"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("username")));
}

#[test]
async fn test_duplicate_license_and_national_id_are_rejected() {
    let repo = MemoryRepository::new();
    repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();

    let err = repo.register_driver(new_driver("b", "N2", "L1")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("license_number")));

    let err = repo.register_driver(new_driver("c", "N1", "L3")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("national_id")));

    // Failed registrations leave no identity behind.
    assert!(repo.find_credentials("b").await.unwrap().is_none());
    assert_eq!(repo.list_drivers().await.unwrap().len(), 1);
}

#[test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_with_one_license_have_one_winner() {
    let repo = Arc::new(MemoryRepository::new());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.register_driver(new_driver(&format!("driver{}", i), &format!("N{}", i), "SAME-LICENSE"))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut validation_errors = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Validation(_)) => validation_errors += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(validation_errors, 7);
    let drivers = repo.list_drivers().await.unwrap();
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].license_number, "SAME-LICENSE");
}

#[test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_vehicles_with_one_plate_have_one_winner() {
    let repo = Arc::new(MemoryRepository::new());
    let owner = repo.register_driver(new_driver("owner", "N1", "L1")).await.unwrap().id;
    let actor = admin_actor();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.create_vehicle(&actor, new_vehicle(owner, "T 100 ABC", true))
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut validation_errors = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Validation(m)) => {
                assert!(m.contains("plate_number"), "unexpected message: {}", m);
                validation_errors += 1;
            }
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(validation_errors, 7);
    assert_eq!(repo.list_vehicles(Visibility::All).await.unwrap().len(), 1);
    let vehicle_logs = repo
        .list_logs()
        .await
        .unwrap()
        .into_iter()
        .filter(|l| l.resource == "Vehicle: T 100 ABC")
        .count();
    assert_eq!(vehicle_logs, 1);
}

#[test]
async fn test_update_may_keep_own_unique_values() {
    let repo = MemoryRepository::new();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();

    let changes = DriverChanges {
        full_name: Some("Renamed".to_string()),
        national_id: Some("N1".to_string()),
        license_number: Some("L1".to_string()),
        is_approved: None,
    };
    let updated = repo.update_driver(&admin_actor(), profile.id, changes).await.unwrap();
    assert_eq!(updated.full_name, "Renamed");
}

#[test]
async fn test_duplicate_plate_on_update() {
    let repo = MemoryRepository::new();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();
    repo.create_vehicle(&admin_actor(), new_vehicle(profile.id, "T 100 AAA", true))
        .await
        .unwrap();
    let second = repo
        .create_vehicle(&admin_actor(), new_vehicle(profile.id, "T 200 BBB", true))
        .await
        .unwrap();

    let changes = VehicleChanges {
        plate_number: Some("T 100 AAA".to_string()),
        ..VehicleChanges::default()
    };
    let err = repo.update_vehicle(&admin_actor(), second.id, changes).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("plate_number")));
}

// --- References & cascades ---

#[test]
async fn test_vehicle_for_unknown_profile_is_rejected() {
    let repo = MemoryRepository::new();
    let err = repo
        .create_vehicle(&admin_actor(), new_vehicle(Uuid::new_v4(), "T 1", true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(repo.list_logs().await.unwrap().is_empty());
}

#[test]
async fn test_deleting_a_driver_cascades_to_vehicles_and_schedules() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();
    let vehicle = repo.create_vehicle(&actor, new_vehicle(profile.id, "T 1", true)).await.unwrap();
    let route = repo.create_route(&actor, new_route("Kariakoo", "Mbagala")).await.unwrap();
    repo.create_schedule(&actor, new_schedule(vehicle.id, route.id, true)).await.unwrap();

    repo.delete_driver(&actor, profile.id).await.unwrap();

    assert!(repo.list_vehicles(Visibility::All).await.unwrap().is_empty());
    assert!(repo.list_schedules(Visibility::All).await.unwrap().is_empty());
    assert!(matches!(repo.get_vehicle(vehicle.id).await, Err(AppError::NotFound(_))));
    // The identity itself survives without a profile.
    assert!(repo.driver_profile_for(profile.user_id).await.unwrap().is_none());
    assert!(repo.get_identity(profile.user_id).await.unwrap().is_some());
}

#[test]
async fn test_missing_records_are_not_found() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let id = Uuid::new_v4();

    assert!(matches!(repo.get_driver(id).await, Err(AppError::NotFound(_))));
    assert!(matches!(repo.get_route(id).await, Err(AppError::NotFound(_))));
    assert!(matches!(repo.delete_vehicle(&actor, id).await, Err(AppError::NotFound(_))));
    assert!(matches!(
        repo.update_schedule(&actor, id, ScheduleChanges::default()).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(repo.get_log(42).await, Err(AppError::NotFound(_))));
}

// --- Visibility ---

#[test]
async fn test_vehicle_listing_respects_visibility() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let a = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();
    let b = repo.register_driver(new_driver("b", "N2", "L2")).await.unwrap();
    repo.create_vehicle(&actor, new_vehicle(a.id, "A-ACTIVE", true)).await.unwrap();
    repo.create_vehicle(&actor, new_vehicle(a.id, "A-PARKED", false)).await.unwrap();
    repo.create_vehicle(&actor, new_vehicle(b.id, "B-ACTIVE", true)).await.unwrap();

    let plates = |vehicles: Vec<fleet_admin::models::Vehicle>| {
        vehicles.into_iter().map(|v| v.plate_number).collect::<Vec<_>>()
    };

    assert_eq!(
        plates(repo.list_vehicles(Visibility::OwnedBy(a.user_id)).await.unwrap()),
        vec!["A-ACTIVE", "A-PARKED"]
    );
    assert_eq!(
        plates(repo.list_vehicles(Visibility::ActiveOnly).await.unwrap()),
        vec!["A-ACTIVE", "B-ACTIVE"]
    );
    assert_eq!(repo.list_vehicles(Visibility::All).await.unwrap().len(), 3);
    // A driver with nothing sees an empty list, not an error.
    assert!(repo
        .list_vehicles(Visibility::OwnedBy(Uuid::new_v4()))
        .await
        .unwrap()
        .is_empty());
}

#[test]
async fn test_schedule_projection_and_active_filter() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();
    let vehicle = repo.create_vehicle(&actor, new_vehicle(profile.id, "T 1", true)).await.unwrap();
    let route = repo.create_route(&actor, new_route("Ubungo", "Posta")).await.unwrap();

    let active = repo.create_schedule(&actor, new_schedule(vehicle.id, route.id, true)).await.unwrap();
    repo.create_schedule(&actor, new_schedule(vehicle.id, route.id, false)).await.unwrap();

    assert_eq!(active.vehicle_plate, "T 1");
    assert_eq!(active.route_label, "Ubungo - Posta");
    assert_eq!(active.owner_user_id, profile.user_id);

    let visible = repo.list_schedules(Visibility::ActiveOnly).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible.iter().all(|s| s.is_active));
}

// --- Audit atomicity & ordering ---

#[test]
async fn test_each_mutation_appends_exactly_one_entry() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();

    let route = repo.create_route(&actor, new_route("Kimara", "Gerezani")).await.unwrap();
    assert_eq!(repo.list_logs().await.unwrap().len(), 1);

    let changes = RouteChanges {
        start_point: Some("Kimara Mwisho".to_string()),
        is_active: Some(true),
        ..RouteChanges::default()
    };
    repo.update_route(&actor, route.id, changes).await.unwrap();
    repo.delete_route(&actor, route.id).await.unwrap();

    let logs = repo.list_logs().await.unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].action, AuditAction::Delete);
    assert_eq!(logs[0].resource, "Route: Kimara Mwisho - Gerezani");
    assert_eq!(logs[0].details, "");
    assert_eq!(logs[1].action, AuditAction::Update);
    // is_active did not change, so only start_point is listed.
    assert_eq!(logs[1].details, "Updated fields: start_point");
    assert_eq!(logs[2].action, AuditAction::Create);
    assert_eq!(logs[2].resource, "Route: Kimara - Gerezani");
    assert!(logs.iter().all(|l| l.user == actor.id));
}

#[test]
async fn test_logs_are_strictly_newest_first() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    for i in 0..20 {
        repo.create_route(&actor, new_route(&format!("S{}", i), "E")).await.unwrap();
    }

    let logs = repo.list_logs().await.unwrap();
    assert_eq!(logs.len(), 20);
    for pair in logs.windows(2) {
        assert!(pair[0].timestamp > pair[1].timestamp);
        assert!(pair[0].id > pair[1].id);
    }
    assert_eq!(logs[0].resource, "Route: S19 - E");
}

#[test]
async fn test_failed_audit_rolls_back_the_mutation() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();
    let vehicle = repo.create_vehicle(&actor, new_vehicle(profile.id, "T 1", true)).await.unwrap();
    let logs_before = repo.list_logs().await.unwrap().len();

    repo.set_audit_failure(true);

    let err = repo
        .update_driver(
            &actor,
            profile.id,
            DriverChanges {
                is_approved: Some(true),
                ..DriverChanges::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    let err = repo.delete_vehicle(&actor, vehicle.id).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    let err = repo
        .create_route(&actor, new_route("X", "Y"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    repo.set_audit_failure(false);

    // Nothing changed and nothing was logged.
    assert!(!repo.get_driver(profile.id).await.unwrap().is_approved);
    assert!(repo.get_vehicle(vehicle.id).await.is_ok());
    assert!(repo.list_routes().await.unwrap().is_empty());
    assert_eq!(repo.list_logs().await.unwrap().len(), logs_before);
}

#[test]
async fn test_failing_store_rejects_registration_entirely() {
    let repo = MemoryRepository::new_failing();
    let err = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap_err();

    assert!(matches!(err, AppError::Internal(_)));
    assert!(repo.find_credentials("a").await.unwrap().is_none());
    assert!(repo.list_drivers().await.unwrap().is_empty());
}

#[test]
async fn test_approval_toggle_details() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();

    let approve = DriverChanges {
        is_approved: Some(true),
        ..DriverChanges::default()
    };
    let revoke = DriverChanges {
        is_approved: Some(false),
        ..DriverChanges::default()
    };
    repo.update_driver(&actor, profile.id, approve).await.unwrap();
    repo.update_driver(&actor, profile.id, revoke).await.unwrap();

    let logs = repo.list_logs().await.unwrap();
    assert_eq!(logs[0].action, AuditAction::Approval);
    assert_eq!(logs[0].details, "Status changed to Pending");
    assert_eq!(logs[1].action, AuditAction::Approval);
    assert_eq!(logs[1].details, "Status changed to Approved");
    assert_eq!(logs[1].resource, "Driver: a Full");
}

#[test]
async fn test_registration_entry_names_the_new_identity() {
    let repo = MemoryRepository::new();
    let profile = repo.register_driver(new_driver("neema", "N1", "L1")).await.unwrap();

    let log = &repo.list_logs().await.unwrap()[0];
    assert_eq!(log.action, AuditAction::Create);
    assert_eq!(log.resource, "Driver: neema Full");
    assert_eq!(log.details, "Registered as Driver");
    assert_eq!(log.user, Some(profile.user_id));
    assert_eq!(log.username.as_deref(), Some("neema"));
}

#[test]
async fn test_admin_bootstrap_is_idempotent() {
    let repo = MemoryRepository::new();
    assert!(repo.ensure_admin("root", "hash".to_string()).await.unwrap());
    assert!(!repo.ensure_admin("root", "other".to_string()).await.unwrap());

    let creds = repo.find_credentials("root").await.unwrap().unwrap();
    assert_eq!(creds.role, Role::Admin);
    assert_eq!(creds.password_hash, "hash");

    let logs = repo.list_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].resource, "Admin: root");
    assert_eq!(logs[0].user, None);
}

#[test]
async fn test_schedule_update_validates_window_and_days() {
    let repo = MemoryRepository::new();
    let actor = admin_actor();
    let profile = repo.register_driver(new_driver("a", "N1", "L1")).await.unwrap();
    let vehicle = repo.create_vehicle(&actor, new_vehicle(profile.id, "T 1", true)).await.unwrap();
    let route = repo.create_route(&actor, new_route("A", "B")).await.unwrap();
    let schedule = repo.create_schedule(&actor, new_schedule(vehicle.id, route.id, true)).await.unwrap();

    let inverted = ScheduleChanges {
        arrival_start_time: NaiveTime::from_hms_opt(10, 0, 0),
        ..ScheduleChanges::default()
    };
    let err = repo.update_schedule(&actor, schedule.id, inverted).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let days = ScheduleChanges {
        days_of_week: Some(DaysOfWeek(vec!["friday".into(), "Sat".into(), "FRI".into()])),
        ..ScheduleChanges::default()
    };
    let updated = repo.update_schedule(&actor, schedule.id, days).await.unwrap();
    assert_eq!(updated.days_of_week, vec!["Fri", "Sat"]);
}

#[test]
async fn test_log_detail_matches_listing() {
    let repo = MemoryRepository::new();
    let profile = repo.register_driver(new_driver("juma", "N1", "L1")).await.unwrap();
    let driver = Actor::user(profile.user_id, Role::Driver);
    repo.create_vehicle(&driver, new_vehicle(profile.id, "T 5", true)).await.unwrap();
    // An actor with no identity in the store resolves to no username.
    repo.create_route(&admin_actor(), new_route("Mwenge", "Posta")).await.unwrap();

    let listed = repo.list_logs().await.unwrap();
    assert_eq!(listed.len(), 3);
    for entry in &listed {
        let detail = repo.get_log(entry.id).await.unwrap();
        assert_eq!(detail.username, entry.username, "log {}", entry.id);
        assert_eq!(detail.user, entry.user);
        assert_eq!(detail.resource, entry.resource);
    }
    assert_eq!(listed[1].username.as_deref(), Some("juma"));
    assert_eq!(listed[0].username, None);
}
