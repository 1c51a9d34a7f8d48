use chrono::NaiveTime;
use fleet_admin::{
    AppError,
    models::{
        AuditAction, CreateScheduleRequest, DaysOfWeek, DriverChanges, Role, Route, RouteChanges,
        Stats, Vehicle, VehicleChanges, check_distance, check_time_window,
    },
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

fn route() -> Route {
    Route {
        id: Uuid::new_v4(),
        start_point: "Kariakoo".to_string(),
        end_point: "Mbagala".to_string(),
        distance: Some(Decimal::new(1250, 2)),
        is_active: true,
    }
}

// --- Enumerations ---

#[test]
fn test_role_and_action_serialize_uppercase() {
    assert_eq!(serde_json::to_value(Role::Driver).unwrap(), json!("DRIVER"));
    assert_eq!(serde_json::to_value(AuditAction::Approval).unwrap(), json!("APPROVAL"));
    let role: Role = serde_json::from_value(json!("PASSENGER")).unwrap();
    assert_eq!(role, Role::Passenger);
}

// --- Days of week ---

#[test]
fn test_days_accept_list_and_csv() {
    let from_list: DaysOfWeek = serde_json::from_value(json!(["Tue", "Mon"])).unwrap();
    let from_csv: DaysOfWeek = serde_json::from_value(json!("Tue, Mon")).unwrap();
    assert_eq!(from_list, from_csv);
    // Input order is kept, not calendar order.
    assert_eq!(from_list.normalized().unwrap(), vec!["Tue", "Mon"]);
}

#[test]
fn test_days_normalize_case_full_names_and_duplicates() {
    let days = DaysOfWeek(vec![
        "sunday".to_string(),
        " SAT ".to_string(),
        "Sun".to_string(),
    ]);
    assert_eq!(days.normalized().unwrap(), vec!["Sun", "Sat"]);
}

#[test]
fn test_days_reject_unknown_and_empty() {
    let unknown = DaysOfWeek(vec!["Mon".to_string(), "Xy".to_string()]);
    assert!(matches!(unknown.normalized(), Err(AppError::Validation(_))));

    for word in ["Monkey", "Sunshine", "Wednesdayyyy", "Tues"] {
        let days = DaysOfWeek(vec![word.to_string()]);
        assert!(
            matches!(days.normalized(), Err(AppError::Validation(ref m)) if m.contains(word)),
            "{} should not be accepted as a weekday",
            word
        );
    }

    let empty: DaysOfWeek = serde_json::from_value(json!(" , ")).unwrap();
    assert!(matches!(empty.normalized(), Err(AppError::Validation(_))));
}

#[test]
fn test_schedule_request_deserializes_times() {
    let request: CreateScheduleRequest = serde_json::from_value(json!({
        "vehicle": Uuid::new_v4(),
        "route": Uuid::new_v4(),
        "arrival_start_time": "07:30:00",
        "arrival_end_time": "09:00:00",
        "days_of_week": ["Mon"],
    }))
    .unwrap();
    assert_eq!(request.arrival_start_time, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    assert!(request.is_active.is_none());
}

// --- Field rules ---

#[test]
fn test_distance_bounds() {
    assert!(check_distance(Decimal::ZERO).is_ok());
    assert!(check_distance(Decimal::new(99999, 2)).is_ok());
    assert!(check_distance(Decimal::new(-1, 0)).is_err());
    assert!(check_distance(Decimal::new(1000, 0)).is_err());
    assert!(check_distance(Decimal::new(1005, 3)).is_err());
    // Trailing zeros do not count as extra precision.
    assert!(check_distance(Decimal::new(12500, 3)).is_ok());
}

#[test]
fn test_time_window_allows_equal_bounds() {
    let t = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    assert!(check_time_window(t, t).is_ok());
    assert!(check_time_window(t, NaiveTime::from_hms_opt(7, 59, 0).unwrap()).is_err());
}

#[test]
fn test_route_display_and_blank_check() {
    let mut r = route();
    assert_eq!(r.display(), "Kariakoo - Mbagala");
    r.end_point = "   ".to_string();
    assert!(matches!(r.check(), Err(AppError::Validation(ref m)) if m.contains("end_point")));
}

// --- Partial vs full updates ---

#[test]
fn test_route_changes_distinguish_absent_from_cleared() {
    let absent: RouteChanges = serde_json::from_value(json!({ "start_point": "Ubungo" })).unwrap();
    assert_eq!(absent.distance, None);

    let cleared: RouteChanges = serde_json::from_value(json!({ "distance": null })).unwrap();
    assert_eq!(cleared.distance, Some(None));

    let mut r = route();
    assert_eq!(absent.apply_to(&mut r), vec!["start_point"]);
    assert_eq!(cleared.apply_to(&mut r), vec!["distance"]);
    assert_eq!(r.distance, None);
    // Same values again: nothing changed.
    assert!(cleared.apply_to(&mut r).is_empty());
}

#[test]
fn test_full_update_lists_missing_fields() {
    let changes = DriverChanges {
        full_name: Some("Juma".to_string()),
        ..DriverChanges::default()
    };
    let err = changes.require_complete().unwrap_err();
    assert!(
        matches!(err, AppError::Validation(ref m) if m == "Full update requires: national_id, license_number, is_approved")
    );

    let complete = VehicleChanges {
        plate_number: Some("T 1".to_string()),
        vehicle_type: Some("Bus".to_string()),
        capacity: Some(40),
        color: Some("Red".to_string()),
        is_active: Some(false),
    };
    assert!(complete.require_complete().is_ok());
}

#[test]
fn test_vehicle_changes_never_touch_owner() {
    let owner = Uuid::new_v4();
    let mut vehicle = Vehicle {
        id: Uuid::new_v4(),
        driver: owner,
        driver_name: "Juma".to_string(),
        owner_user_id: Uuid::new_v4(),
        plate_number: "T 1".to_string(),
        vehicle_type: "Daladala".to_string(),
        capacity: 30,
        color: "Blue".to_string(),
        is_active: true,
    };
    // Unknown keys such as "driver" are ignored by the changes payload.
    let changes: VehicleChanges =
        serde_json::from_value(json!({ "driver": Uuid::new_v4(), "is_active": false })).unwrap();
    changes.apply_to(&mut vehicle);

    assert_eq!(vehicle.driver, owner);
    assert!(!vehicle.is_active);
}

// --- Serialization ---

#[test]
fn test_owner_identity_is_not_serialized() {
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        driver: Uuid::new_v4(),
        driver_name: "Juma".to_string(),
        owner_user_id: Uuid::new_v4(),
        plate_number: "T 1".to_string(),
        vehicle_type: "Daladala".to_string(),
        capacity: 30,
        color: "Blue".to_string(),
        is_active: true,
    };
    let value = serde_json::to_value(&vehicle).unwrap();
    assert!(value.get("owner_user_id").is_none());
    assert_eq!(value["driver_name"], "Juma");
}

#[test]
fn test_stats_serialize_untagged() {
    let stats = Stats::Admin(fleet_admin::models::AdminStats {
        total_users: 3,
        active_vehicles: 1,
        total_routes: 2,
        pending_drivers: 1,
    });
    let value = serde_json::to_value(&stats).unwrap();
    assert_eq!(value, json!({
        "total_users": 3,
        "active_vehicles": 1,
        "total_routes": 2,
        "pending_drivers": 1,
    }));
}
