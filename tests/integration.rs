use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ride_dispatch::api::rest::router;
use ride_dispatch::config::Config;
use ride_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_config() -> Config {
    Config {
        http_port: 0,
        log_level: "info".to_string(),
        event_buffer_size: 64,
        default_search_radius_km: 5.0,
        default_search_limit: 10,
        location_history_cap: 100,
    }
}

fn setup() -> axum::Router {
    router(Arc::new(AppState::new(test_config())))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn patch_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn driver_payload(n: u32) -> Value {
    json!({
        "full_name": format!("Driver {n}"),
        "phone": format!("+3361234{n:04}"),
        "license_number": format!("LIC-{n:04}"),
        "identity_document": "id-document.png",
        "vehicle": {
            "brand": "Toyota",
            "model": "Corolla",
            "color": "Blanc",
            "year": 2020,
            "plate_number": format!("AB-{n:04}-CD"),
            "city": "Paris",
            "vehicle_type": "OWNED"
        }
    })
}

async fn register_driver(app: &axum::Router, n: u32) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/drivers", driver_payload(n)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

/// Registers a driver, records a location and flips it available.
async fn online_driver(app: &axum::Router, n: u32, lat: f64, lng: f64) -> String {
    let driver = register_driver(app, n).await;
    let id = driver["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/drivers/{id}/location"),
            json!({ "latitude": lat, "longitude": lng }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/drivers/{id}/availability"),
            json!({ "is_available": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    id
}

async fn register_passenger(app: &axum::Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/passengers",
            json!({ "name": name, "phone": format!("+336000{}", name.len()) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["id"]
        .as_str()
        .unwrap()
        .to_string()
}

fn ride_payload(passenger_id: &str) -> Value {
    json!({
        "passenger_id": passenger_id,
        "pickup": { "lat": 48.8566, "lng": 2.3522 },
        "pickup_address": "1 Rue de Rivoli",
        "dropoff": { "lat": 48.8584, "lng": 2.2945 },
        "dropoff_address": "Champ de Mars",
        "price": 12.5,
        "duration_min": 15
    })
}

async fn create_ride(app: &axum::Router, passenger_id: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/rides", ride_payload(passenger_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let app = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["passengers"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["rides"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let app = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("drivers_available"));
}

#[tokio::test]
async fn register_driver_returns_driver() {
    let app = setup();
    let driver = register_driver(&app, 1).await;

    assert_eq!(driver["full_name"], "Driver 1");
    assert_eq!(driver["is_registration_complete"], true);
    assert_eq!(driver["is_available"], false);
    assert_eq!(driver["total_rides"], 0);
    assert!(driver["location"].is_null());
    assert_eq!(driver["vehicle"]["vehicle_type"], "OWNED");
    assert!(!driver["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_driver_phone_conflicts() {
    let app = setup();
    register_driver(&app, 1).await;

    let mut duplicate = driver_payload(2);
    duplicate["phone"] = driver_payload(1)["phone"].clone();
    let response = app
        .oneshot(json_request("POST", "/drivers", duplicate))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn driver_without_identity_document_cannot_go_available() {
    let app = setup();

    let mut incomplete = driver_payload(1);
    incomplete["identity_document"] = Value::Null;
    let response = app
        .clone()
        .oneshot(json_request("POST", "/drivers", incomplete))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let driver = body_json(response).await;
    assert_eq!(driver["is_registration_complete"], false);
    let id = driver["id"].as_str().unwrap();

    let response = app
        .oneshot(patch_request(
            &format!("/drivers/{id}/availability"),
            json!({ "is_available": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_ride_computes_distance() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;

    let ride = create_ride(&app, &passenger_id).await;

    assert_eq!(ride["status"], "REQUESTED");
    assert!(ride["driver_id"].is_null());
    assert!(!ride["requested_at"].is_null());
    let distance = ride["distance_km"].as_f64().unwrap();
    assert!((distance - 4.23).abs() < 0.1);
}

#[tokio::test]
async fn create_ride_for_unknown_passenger_returns_404() {
    let app = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/rides",
            ride_payload("00000000-0000-0000-0000-000000000000"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_ride_with_negative_price_returns_400() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;

    let mut payload = ride_payload(&passenger_id);
    payload["price"] = json!(-5.0);
    let response = app
        .oneshot(json_request("POST", "/rides", payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_active_ride_for_passenger_conflicts() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;
    create_ride(&app, &passenger_id).await;

    let response = app
        .oneshot(json_request("POST", "/rides", ride_payload(&passenger_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn accept_ride_binds_driver_and_notifies_passenger() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;
    let driver_id = online_driver(&app, 1, 48.857, 2.353).await;
    let ride = create_ride(&app, &passenger_id).await;
    let ride_id = ride["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            json!({ "driver_id": driver_id, "current_lat": 48.858, "current_lng": 2.354 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "ACCEPTED");
    assert_eq!(accepted["driver_id"], driver_id.as_str());
    assert!(!accepted["accepted_at"].is_null());

    // accepting does not flip the availability flag
    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert_eq!(driver["is_available"], true);
    assert_eq!(driver["location"]["lat"], 48.858);

    let response = app
        .oneshot(get_request(&format!(
            "/users/{passenger_id}/notifications"
        )))
        .await
        .unwrap();
    let inbox = body_json(response).await;
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["title"], "Driver found");
}

#[tokio::test]
async fn second_driver_accepting_the_same_ride_conflicts() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;
    let first = online_driver(&app, 1, 48.857, 2.353).await;
    let second = online_driver(&app, 2, 48.858, 2.354).await;
    let ride = create_ride(&app, &passenger_id).await;
    let ride_id = ride["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            json!({ "driver_id": first }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            json!({ "driver_id": second }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // the winner stays bound
    let response = app
        .oneshot(get_request(&format!("/rides/{ride_id}")))
        .await
        .unwrap();
    let stored = body_json(response).await;
    assert_eq!(stored["driver_id"], first.as_str());
}

#[tokio::test]
async fn invalid_transition_returns_400_and_leaves_the_ride() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;
    let driver_id = online_driver(&app, 1, 48.857, 2.353).await;
    let ride = create_ride(&app, &passenger_id).await;
    let ride_id = ride["id"].as_str().unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            json!({ "driver_id": driver_id }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "COMPLETED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("ACCEPTED -> COMPLETED"));

    let response = app
        .oneshot(get_request(&format!("/rides/{ride_id}")))
        .await
        .unwrap();
    let unchanged = body_json(response).await;
    assert_eq!(unchanged["status"], "ACCEPTED");
    assert!(unchanged["started_at"].is_null());
    assert!(unchanged["completed_at"].is_null());
}

#[tokio::test]
async fn full_ride_flow_completes_and_updates_driver_stats() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;
    let driver_id = online_driver(&app, 1, 48.857, 2.353).await;
    let ride = create_ride(&app, &passenger_id).await;
    let ride_id = ride["id"].as_str().unwrap();

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            json!({ "driver_id": driver_id }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "ARRIVING" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let arriving = body_json(response).await;
    let started_at = arriving["started_at"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "IN_PROGRESS" }),
        ))
        .await
        .unwrap();
    let in_progress = body_json(response).await;
    assert_eq!(in_progress["started_at"], started_at.as_str());

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "COMPLETED" }),
        ))
        .await
        .unwrap();
    let completed = body_json(response).await;
    assert_eq!(completed["status"], "COMPLETED");
    assert!(!completed["completed_at"].is_null());

    let response = app
        .clone()
        .oneshot(get_request(&format!("/drivers/{driver_id}")))
        .await
        .unwrap();
    let driver = body_json(response).await;
    assert_eq!(driver["total_rides"], 1);

    // both parties are free again
    let response = app
        .oneshot(json_request("POST", "/rides", ride_payload(&passenger_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cancelling_a_ride_records_the_reason() {
    let app = setup();
    let passenger_id = register_passenger(&app, "Alice").await;
    let ride = create_ride(&app, &passenger_id).await;
    let ride_id = ride["id"].as_str().unwrap();

    let response = app
        .oneshot(patch_request(
            &format!("/rides/{ride_id}/status"),
            json!({ "status": "CANCELLED", "cancel_reason": "waited too long" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cancelled = body_json(response).await;
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["cancel_reason"], "waited too long");
    assert!(!cancelled["cancelled_at"].is_null());
}

#[tokio::test]
async fn available_rides_feed_is_oldest_first() {
    let app = setup();
    let alice = register_passenger(&app, "Alice").await;
    let bob = register_passenger(&app, "Bobby").await;

    let first = create_ride(&app, &alice).await;
    let second = create_ride(&app, &bob).await;

    let response = app.oneshot(get_request("/rides/available")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let feed = body_json(response).await;
    let feed = feed.as_array().unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0]["id"], first["id"]);
    assert_eq!(feed[1]["id"], second["id"]);
}

#[tokio::test]
async fn nearby_search_sorts_and_filters() {
    let app = setup();
    let near = online_driver(&app, 1, 48.8570, 2.3530).await;
    let further = online_driver(&app, 2, 48.8600, 2.3700).await;
    // outside a 5 km radius
    let far = online_driver(&app, 3, 48.9566, 2.3522).await;
    // in range but offline
    let offline = online_driver(&app, 4, 48.8568, 2.3525).await;
    app.clone()
        .oneshot(patch_request(
            &format!("/drivers/{offline}/availability"),
            json!({ "is_available": false }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request(
            "/drivers/nearby?lat=48.8566&lng=2.3522&radius=5",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["search_location"]["radius"], 5.0);

    let drivers = body["drivers"].as_array().unwrap();
    assert_eq!(drivers.len(), 2);
    assert_eq!(drivers[0]["driver_id"], near.as_str());
    assert_eq!(drivers[1]["driver_id"], further.as_str());
    for driver in drivers {
        assert!(driver["distance_km"].as_f64().unwrap() <= 5.0);
        assert_ne!(driver["driver_id"], far.as_str());
        assert_ne!(driver["driver_id"], offline.as_str());
    }
}

#[tokio::test]
async fn nearby_search_requires_coordinates() {
    let app = setup();
    let response = app
        .oneshot(get_request("/drivers/nearby?radius=5"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn nearby_search_rejects_out_of_range_radius() {
    let app = setup();
    let response = app
        .oneshot(get_request(
            "/drivers/nearby?lat=48.8566&lng=2.3522&radius=200",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn location_history_is_recorded_per_ping() {
    let app = setup();
    let driver = register_driver(&app, 1).await;
    let id = driver["id"].as_str().unwrap();

    for latitude in [48.850, 48.851, 48.852] {
        let response = app
            .clone()
            .oneshot(patch_request(
                &format!("/drivers/{id}/location"),
                json!({ "latitude": latitude, "longitude": 2.35 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get_request(&format!(
            "/drivers/{id}/location/history?limit=2"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let history = body_json(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    // newest first
    assert_eq!(history[0]["location"]["lat"], 48.852);

    let response = app
        .oneshot(get_request(&format!("/drivers/{id}/location")))
        .await
        .unwrap();
    let snapshot = body_json(response).await;
    assert_eq!(snapshot["location"]["lat"], 48.852);
}

#[tokio::test]
async fn unknown_ride_returns_404() {
    let app = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(get_request(&format!("/rides/{fake_id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
