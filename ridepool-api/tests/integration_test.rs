use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use ridepool_api::middleware::Claims;
use ridepool_api::state::{AppState, AuthConfig};
use ridepool_api::app;
use ridepool_core::ride::{NewRide, Place, Ride, RideStatus};
use ridepool_core::search::SearchPolicy;
use ridepool_core::RideService;
use ridepool_store::app_config::RateLimitConfig;
use ridepool_store::{EventProducer, InMemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-test-secret";

struct TestApp {
    router: Router,
    store: Arc<InMemoryStore>,
}

fn test_app() -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let service = RideService::new(store.clone(), store.clone(), store.clone(), SearchPolicy::default());
    let state = AppState {
        service,
        redis: None,
        events: EventProducer::disabled(),
        auth: AuthConfig { secret: SECRET.to_string() },
        rate_limit: RateLimitConfig { requests: 100, window_seconds: 60 },
    };
    TestApp { router: app(state), store }
}

fn token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    sub: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(sub) = sub {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(sub)));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn register(router: &Router, sub: &str) -> Uuid {
    let (status, user) = send(
        router,
        Method::POST,
        "/v1/users",
        Some(sub),
        Some(json!({ "name": sub, "email": format!("{}@example.com", sub) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", user);
    user["id"].as_str().unwrap().parse().unwrap()
}

async fn register_driver(router: &Router, sub: &str) -> Uuid {
    let id = register(router, sub).await;
    let (status, body) = send(
        router,
        Method::POST,
        "/v1/driver/upgrade",
        Some(sub),
        Some(json!({
            "make": "Toyota",
            "model": "Prius",
            "year": 2022,
            "color": "Silver",
            "plate": "RIDE123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    id
}

fn ride_body(label: &str, lat: f64, lng: f64, seats: i32) -> Value {
    json!({
        "origin": { "label": label, "lat": lat, "lng": lng },
        "destination": { "label": "JFK", "lat": 40.6413, "lng": -73.7781 },
        "departure_time": (Utc::now() + Duration::hours(3)).to_rfc3339(),
        "seats_total": seats,
        "price_amount": 1500
    })
}

async fn post_ride(router: &Router, driver: &str, label: &str, lat: f64, lng: f64, seats: i32) -> Uuid {
    let (status, ride) = send(
        router,
        Method::POST,
        "/v1/rides",
        Some(driver),
        Some(ride_body(label, lat, lng, seats)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", ride);
    ride["id"].as_str().unwrap().parse().unwrap()
}

async fn book(router: &Router, rider: &str, ride_id: Uuid, seats: i64) -> (StatusCode, Value) {
    send(
        router,
        Method::POST,
        "/v1/bookings",
        Some(rider),
        Some(json!({ "ride_id": ride_id, "seats_requested": seats })),
    )
    .await
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let t = test_app();
    let (status, body) = send(&t.router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let t = test_app();
    let (status, body) = send(&t.router, Method::GET, "/v1/me/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .uri("/v1/me/bookings")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = t.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_driver_upgrade_and_ride_lifecycle() {
    let t = test_app();
    register(&t.router, "dana").await;

    let (_, status) = send(&t.router, Method::GET, "/v1/me/driver-status", Some("dana"), None).await;
    assert_eq!(status["is_driver"], false);

    // Riders cannot post until upgraded.
    let (code, body) = send(
        &t.router,
        Method::POST,
        "/v1/rides",
        Some("dana"),
        Some(ride_body("Downtown", 40.7080, -74.0090, 3)),
    )
    .await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Only verified drivers can post rides");

    register_driver(&t.router, "dana").await;
    let (_, status) = send(&t.router, Method::GET, "/v1/me/driver-status", Some("dana"), None).await;
    assert_eq!(status["is_driver"], true);

    let ride_id = post_ride(&t.router, "dana", "  Downtown  ", 40.7080, -74.0090, 3).await;
    let (code, details) =
        send(&t.router, Method::GET, &format!("/v1/rides/{}", ride_id), Some("dana"), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(details["ride"]["origin"]["label"], "Downtown");
    assert_eq!(details["ride"]["status"], "open");
    assert_eq!(details["ride"]["seats_available"], 3);
    assert_eq!(details["driver"]["name"], "dana");
    assert_eq!(details["vehicle"]["plate"], "RIDE123");

    let (code, _) = send(
        &t.router,
        Method::GET,
        &format!("/v1/rides/{}", Uuid::new_v4()),
        Some("dana"),
        None,
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_ids_get_json_errors() {
    let t = test_app();
    register(&t.router, "riley").await;

    let (code, body) = send(&t.router, Method::GET, "/v1/rides/not-a-uuid", Some("riley"), None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not-a-uuid"));

    let (code, body) = send(
        &t.router,
        Method::POST,
        "/v1/bookings/x/confirm-payment",
        Some("riley"),
        Some(json!({ "payment_reference": "pi_123" })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_invalid_vehicle_is_rejected() {
    let t = test_app();
    register(&t.router, "dana").await;
    let (code, body) = send(
        &t.router,
        Method::POST,
        "/v1/driver/upgrade",
        Some("dana"),
        Some(json!({ "make": "Toyota", "model": "", "year": 2022, "color": "Red", "plate": "X1" })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_search_radius_and_ordering() {
    let t = test_app();
    register_driver(&t.router, "dana").await;
    let brooklyn = post_ride(&t.router, "dana", "Brooklyn", 40.6782, -73.9442, 3).await;
    let jersey_city = post_ride(&t.router, "dana", "Jersey City", 40.7178, -74.0431, 3).await;
    post_ride(&t.router, "dana", "Newark Airport", 40.6895, -74.1745, 3).await;

    register(&t.router, "riley").await;
    let (code, body) = send(
        &t.router,
        Method::GET,
        "/v1/rides/nearby?lat=40.7128&lng=-74.0060&radius_km=10",
        Some("riley"),
        None,
    )
    .await;
    assert_eq!(code, StatusCode::OK, "{}", body);
    assert_eq!(body["count"], 2);
    assert_eq!(body["radius_km"], 10.0);

    let rides = body["rides"].as_array().unwrap();
    assert_eq!(rides[0]["ride"]["id"], jersey_city.to_string());
    assert_eq!(rides[1]["ride"]["id"], brooklyn.to_string());
    let first = rides[0]["distance_km"].as_f64().unwrap();
    let second = rides[1]["distance_km"].as_f64().unwrap();
    assert!(first <= second && second <= 10.0);
    assert_eq!(rides[0]["driver"]["name"], "dana");

    // Drivers never see their own rides.
    let (_, own) = send(
        &t.router,
        Method::GET,
        "/v1/rides/nearby?lat=40.7128&lng=-74.0060&radius_km=10",
        Some("dana"),
        None,
    )
    .await;
    assert_eq!(own["count"], 0);
}

#[tokio::test]
async fn test_search_requires_coordinates() {
    let t = test_app();
    register(&t.router, "riley").await;

    let (code, body) = send(&t.router, Method::GET, "/v1/rides/nearby?lat=40.7", Some("riley"), None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Latitude and longitude are required");

    let (code, _) = send(
        &t.router,
        Method::GET,
        "/v1/rides/nearby?lat=north&lng=-74.0",
        Some("riley"),
        None,
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = send(
        &t.router,
        Method::GET,
        "/v1/rides/nearby?lat=40.7&lng=-74.0&radius_km=-5",
        Some("riley"),
        None,
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_booking_the_last_seats_fills_the_ride() {
    let t = test_app();
    let driver_id = register_driver(&t.router, "dana").await;

    let now = Utc::now();
    let mut ride = Ride::new(
        driver_id,
        NewRide {
            origin: Place { label: "Downtown".to_string(), lat: 40.7080, lng: -74.0090 },
            destination: Place { label: "EWR".to_string(), lat: 40.6895, lng: -74.1745 },
            departure_time: now + Duration::hours(2),
            arrival_time: None,
            seats_total: 4,
            price_amount: 1800,
            currency: None,
        },
        now,
    );
    ride.seats_available = 2;
    let ride_id = ride.id;
    t.store.insert_ride(ride).await;

    register(&t.router, "riley").await;
    let (code, body) = book(&t.router, "riley", ride_id, 2).await;
    assert_eq!(code, StatusCode::CREATED, "{}", body);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["seats_booked"], 2);
    assert_eq!(body["total_price"], 3600);
    assert_eq!(body["currency"], "USD");

    let stored = t.store.ride(ride_id).await.unwrap();
    assert_eq!(stored.seats_available, 0);
    assert_eq!(stored.status, RideStatus::Full);

    register(&t.router, "sam").await;
    let (code, body) = book(&t.router, "sam", ride_id, 1).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Ride is full and cannot accept bookings");
    assert_eq!(t.store.bookings_for_ride(ride_id).await.len(), 1);
}

#[tokio::test]
async fn test_booking_rejections() {
    let t = test_app();
    register_driver(&t.router, "dana").await;
    let ride_id = post_ride(&t.router, "dana", "Downtown", 40.7080, -74.0090, 3).await;
    register(&t.router, "riley").await;

    for seats in [0, 9] {
        let (code, body) = book(&t.router, "riley", ride_id, seats).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid number of seats");
    }

    let (code, _) = send(
        &t.router,
        Method::POST,
        "/v1/bookings",
        Some("riley"),
        Some(json!({ "ride_id": ride_id, "seats_requested": 1.5 })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, body) = book(&t.router, "riley", ride_id, 4).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Only 3 seats available, you requested 4");

    let (code, body) = book(&t.router, "dana", ride_id, 1).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Driver cannot book their own ride");

    let (code, _) = book(&t.router, "nobody", ride_id, 1).await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let (code, _) = book(&t.router, "riley", Uuid::new_v4(), 1).await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let (code, _) = book(&t.router, "riley", ride_id, 1).await;
    assert_eq!(code, StatusCode::CREATED);
    let (code, body) = book(&t.router, "riley", ride_id, 1).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["error"], "You already have a booking for this ride");

    // Only the one successful booking touched the ride.
    let stored = t.store.ride(ride_id).await.unwrap();
    assert_eq!(stored.seats_available, 2);
    assert_eq!(stored.status, RideStatus::Open);
}

#[tokio::test]
async fn test_payment_confirmation() {
    let t = test_app();
    register_driver(&t.router, "dana").await;
    let ride_id = post_ride(&t.router, "dana", "Downtown", 40.7080, -74.0090, 3).await;
    register(&t.router, "riley").await;
    register(&t.router, "sam").await;

    let (_, booking) = book(&t.router, "riley", ride_id, 1).await;
    let booking_id = booking["booking_id"].as_str().unwrap().to_string();
    let uri = format!("/v1/bookings/{}/confirm-payment", booking_id);

    let (code, _) = send(
        &t.router,
        Method::POST,
        &uri,
        Some("riley"),
        Some(json!({ "payment_reference": "   " })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, _) = send(
        &t.router,
        Method::POST,
        &uri,
        Some("sam"),
        Some(json!({ "payment_reference": "pi_123" })),
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    for _ in 0..2 {
        let (code, paid) = send(
            &t.router,
            Method::POST,
            &uri,
            Some("riley"),
            Some(json!({ "payment_reference": "pi_123" })),
        )
        .await;
        assert_eq!(code, StatusCode::OK, "{}", paid);
        assert_eq!(paid["status"], "paid");
        assert_eq!(paid["payment_reference"], "pi_123");
    }

    let (code, _) = send(
        &t.router,
        Method::POST,
        &uri,
        Some("riley"),
        Some(json!({ "payment_reference": "pi_other" })),
    )
    .await;
    assert_eq!(code, StatusCode::CONFLICT);

    // A reference supplied up front books straight to paid.
    let (code, body) = send(
        &t.router,
        Method::POST,
        "/v1/bookings",
        Some("sam"),
        Some(json!({ "ride_id": ride_id, "seats_requested": 1, "payment_reference": "pi_456" })),
    )
    .await;
    assert_eq!(code, StatusCode::CREATED);
    assert_eq!(body["status"], "paid");
}

#[tokio::test]
async fn test_booking_history_is_newest_first() {
    let t = test_app();
    register_driver(&t.router, "dana").await;
    let first = post_ride(&t.router, "dana", "Downtown", 40.7080, -74.0090, 3).await;
    let second = post_ride(&t.router, "dana", "Midtown", 40.7549, -73.9840, 3).await;
    register(&t.router, "riley").await;

    let (_, empty) = send(&t.router, Method::GET, "/v1/me/bookings", Some("riley"), None).await;
    assert_eq!(empty["count"], 0);

    book(&t.router, "riley", first, 1).await;
    book(&t.router, "riley", second, 2).await;

    let (code, body) = send(&t.router, Method::GET, "/v1/me/bookings", Some("riley"), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["count"], 2);
    let bookings = body["bookings"].as_array().unwrap();
    assert_eq!(bookings[0]["ride"]["id"], second.to_string());
    assert_eq!(bookings[0]["booking"]["seats_booked"], 2);
    assert_eq!(bookings[0]["driver"]["name"], "dana");
    assert_eq!(bookings[1]["ride"]["id"], first.to_string());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_never_oversell() {
    let t = test_app();
    register_driver(&t.router, "dana").await;
    let ride_id = post_ride(&t.router, "dana", "Downtown", 40.7080, -74.0090, 3).await;

    let riders: Vec<String> = (0..10).map(|i| format!("rider-{}", i)).collect();
    for rider in &riders {
        register(&t.router, rider).await;
    }

    let handles: Vec<_> = riders
        .into_iter()
        .map(|rider| {
            let router = t.router.clone();
            tokio::spawn(async move { book(&router, &rider, ride_id, 2).await.0 })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!(created, 1);
    let stored = t.store.ride(ride_id).await.unwrap();
    assert_eq!(stored.seats_available, 1);
    assert_eq!(stored.status, RideStatus::Open);
    assert_eq!(t.store.bookings_for_ride(ride_id).await.len(), 1);
}
