use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use fleet_admin::{
    AppConfig, AppState, MemoryRepository, create_router,
    models::{DriverProfile, Route, Schedule, SystemLog, TokenPair, User, Vehicle},
    repository::{Repository, RepositoryState},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
    pub repo: Arc<MemoryRepository>,
    pub client: reqwest::Client,
}

/// Serves the full router on an ephemeral port over an in-memory store.
async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn register_driver(&self, username: &str) -> DriverProfile {
        let response = self
            .client
            .post(self.url("/driver/register"))
            .json(&json!({
                "username": username,
                "password": "pass1234",
                "full_name": format!("{} Dereva", username),
                "national_id": format!("NID-{}", username),
                "license_number": format!("LIC-{}", username),
            }))
            .send()
            .await
            .expect("register fail");
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.unwrap()
    }

    async fn token(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/token"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login fail");
        assert_eq!(response.status(), StatusCode::OK);
        let pair: TokenPair = response.json().await.unwrap();
        pair.access
    }

    /// Admins are never self-registered; seed one straight into the store.
    async fn admin_token(&self) -> String {
        let hash = fleet_admin::auth::hash_password("root-pass".to_string(), 4)
            .await
            .unwrap();
        self.repo.ensure_admin("root", hash).await.unwrap();
        self.token("root", "root-pass").await
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = spawn_app().await;
    let profile = app.register_driver("juma").await;
    assert!(!profile.is_approved);

    let token = app.token("juma", "pass1234").await;
    let response = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me: User = response.json().await.unwrap();
    assert_eq!(me.username, "juma");
    assert_eq!(me.id, profile.user_id);

    let response = app
        .client
        .get(app.url("/drivers/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let own: DriverProfile = response.json().await.unwrap();
    assert_eq!(own.id, profile.id);
}

#[tokio::test]
async fn test_duplicate_registration_is_bad_request() {
    let app = spawn_app().await;
    app.register_driver("juma").await;

    let response = app
        .client
        .post(app.url("/passenger/register"))
        .json(&json!({ "username": "juma", "password": "x", "full_name": "Someone" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_fleet_lifecycle() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let profile = app.register_driver("juma").await;
    let driver = app.token("juma", "pass1234").await;

    // Admin approves the driver.
    let response = app
        .client
        .patch(app.url(&format!("/drivers/{}", profile.id)))
        .bearer_auth(&admin)
        .json(&json!({ "is_approved": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Driver registers a vehicle.
    let response = app
        .client
        .post(app.url("/vehicles"))
        .bearer_auth(&driver)
        .json(&json!({ "plate_number": "T 777 DAR", "capacity": 32, "color": "Yellow" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let vehicle: Vehicle = response.json().await.unwrap();
    assert_eq!(vehicle.driver, profile.id);

    // Admin creates a route; the driver may not.
    let route_body = json!({ "start_point": "Kimara", "end_point": "Kivukoni", "distance": "17.25" });
    let response = app
        .client
        .post(app.url("/routes"))
        .bearer_auth(&driver)
        .json(&route_body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .client
        .post(app.url("/routes"))
        .bearer_auth(&admin)
        .json(&route_body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let route: Route = response.json().await.unwrap();

    // Driver schedules the vehicle on the route.
    let response = app
        .client
        .post(app.url("/schedules"))
        .bearer_auth(&driver)
        .json(&json!({
            "vehicle": vehicle.id,
            "route": route.id,
            "arrival_start_time": "06:00:00",
            "arrival_end_time": "07:15:00",
            "days_of_week": "Mon, Tue, Wed",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let schedule: Schedule = response.json().await.unwrap();
    assert_eq!(schedule.route_label, "Kimara - Kivukoni");

    // Anonymous timetable read.
    let schedules: Vec<Schedule> = app
        .client
        .get(app.url("/schedules"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(schedules.len(), 1);

    // Driver dashboard.
    let stats: Value = app
        .client
        .get(app.url("/stats"))
        .bearer_auth(&driver)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_trips"], 1);
    assert_eq!(stats["active_vehicle"], "T 777 DAR");
    assert_eq!(stats["status"], "Ready");

    // The audit trail, newest first.
    let response = app.client.get(app.url("/logs")).bearer_auth(&driver).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let logs: Vec<SystemLog> = app
        .client
        .get(app.url("/logs"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let resources: Vec<&str> = logs.iter().map(|l| l.resource.as_str()).collect();
    assert_eq!(
        resources,
        vec![
            "Schedule: T 777 DAR",
            "Route: Kimara - Kivukoni",
            "Vehicle: T 777 DAR",
            "Driver: juma Dereva",
            "Driver: juma Dereva",
            "Admin: root",
        ]
    );
    assert_eq!(logs[2].username.as_deref(), Some("juma"));
}

#[tokio::test]
async fn test_anonymous_write_is_unauthorized() {
    let app = create_router(AppState {
        repo: Arc::new(MemoryRepository::new()),
        config: AppConfig::default(),
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/routes")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"start_point":"A","end_point":"B"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_reads_carry_request_id() {
    let app = create_router(AppState {
        repo: Arc::new(MemoryRepository::new()),
        config: AppConfig::default(),
    });

    let response = app
        .oneshot(Request::builder().uri("/routes").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unknown_record_is_not_found() {
    let app = create_router(AppState {
        repo: Arc::new(MemoryRepository::new()),
        config: AppConfig::default(),
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/vehicles/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
