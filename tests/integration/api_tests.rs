//! HTTP tests running the real router in process on the in-memory store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use lms_server::{
    api,
    config::{AppConfig, BootstrapConfig, DatabaseConfig},
    repository::MemoryStore,
    services::Services,
    AppState,
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

const OWNER_EMAIL: &str = "owner@example.org";
const OWNER_PASSWORD: &str = "owner-pass";

async fn setup_app() -> Router {
    let config = AppConfig {
        database: DatabaseConfig {
            url: "memory://".to_string(),
            ..DatabaseConfig::default()
        },
        bootstrap: BootstrapConfig {
            owner_name: Some("Owner".to_string()),
            owner_email: Some(OWNER_EMAIL.to_string()),
            owner_password: Some(OWNER_PASSWORD.to_string()),
        },
        ..AppConfig::default()
    };

    let services = Services::new(Arc::new(MemoryStore::new()), &config);
    services
        .accounts
        .bootstrap_owner(&config.bootstrap)
        .await
        .expect("Failed to bootstrap owner");

    api::create_router(AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    })
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(format!("/api/v1{}", uri));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("No token in response").to_string()
}

/// Owner, one library, its admin and one reader
struct World {
    app: Router,
    owner: String,
    admin: String,
    reader: String,
    library_id: i64,
    reader_id: i64,
}

async fn setup_world() -> World {
    let app = setup_app().await;
    let owner = login(&app, OWNER_EMAIL, OWNER_PASSWORD).await;

    let (status, library) = send(
        &app,
        Method::POST,
        "/libraries",
        Some(&owner),
        Some(json!({ "name": "Central", "location": "Main street" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let library_id = library["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        "/admins",
        Some(&owner),
        Some(json!({
            "name": "Ada",
            "email": "ada@example.org",
            "password": "admin-pass",
            "library_ids": [library_id]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let admin = login(&app, "ada@example.org", "admin-pass").await;

    let (status, reader) = send(
        &app,
        Method::POST,
        "/users",
        Some(&admin),
        Some(json!({
            "name": "Rita",
            "email": "rita@example.org",
            "password": "reader-pass",
            "contact": "555-0100",
            "library_ids": [library_id]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reader["role"], "user");
    let reader_id = reader["id"].as_i64().unwrap();
    let reader = login(&app, "rita@example.org", "reader-pass").await;

    World {
        app,
        owner,
        admin,
        reader,
        library_id,
        reader_id,
    }
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = setup_app().await;

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app, Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_login_and_me() {
    let app = setup_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": OWNER_EMAIL, "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let token = login(&app, "OWNER@example.org", OWNER_PASSWORD).await;
    let (status, body) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "owner");
    assert_eq!(body["email"], OWNER_EMAIL);
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = setup_app().await;

    let (status, _) = send(&app, Method::GET, "/issues", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/issues", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_full_lending_scenario() {
    let w = setup_world().await;

    let (status, book) = send(
        &w.app,
        Method::POST,
        "/books",
        Some(&w.admin),
        Some(json!({
            "isbn": "111",
            "library_id": w.library_id,
            "total_copies": 2,
            "title": "Dune",
            "authors": "Frank Herbert",
            "publisher": "Chilton"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(book["available_copies"], 2);

    let (status, request) = send(
        &w.app,
        Method::POST,
        "/issues",
        Some(&w.reader),
        Some(json!({ "isbn": "111", "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "Pending");
    assert_eq!(request["request_type"], "issue");
    let request_id = request["id"].as_i64().unwrap();

    let (status, _) = send(
        &w.app,
        Method::POST,
        "/issues",
        Some(&w.reader),
        Some(json!({ "isbn": "111", "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, requests) = send(&w.app, Method::GET, "/issues", Some(&w.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requests.as_array().unwrap().len(), 1);

    let (status, approved) = send(
        &w.app,
        Method::PUT,
        &format!("/issues/{}/approve", request_id),
        Some(&w.admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "Approved");

    let (status, record) = send(
        &w.app,
        Method::POST,
        "/issues/books/111",
        Some(&w.admin),
        Some(json!({ "user_id": w.reader_id, "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["issue_status"], "issued");

    let (status, requests) = send(&w.app, Method::GET, "/issues/status", Some(&w.reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requests[0]["status"], "Issued");

    let (status, results) = send(&w.app, Method::GET, "/books/search?title=dune", Some(&w.reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results[0]["available_copies"], 1);
    assert!(results[0].get("next_available_date").is_none());

    let (status, records) = send(&w.app, Method::GET, "/issues/records", Some(&w.reader), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(records.as_array().unwrap().len(), 1);

    let (status, _) = send(
        &w.app,
        Method::POST,
        "/issues/returns",
        Some(&w.reader),
        Some(json!({ "isbn": "111", "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, returned) = send(
        &w.app,
        Method::POST,
        "/issues/books/111/return",
        Some(&w.admin),
        Some(json!({ "user_id": w.reader_id, "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["issue_status"], "returned");

    let (_, results) = send(&w.app, Method::GET, "/books/search", Some(&w.reader), None).await;
    assert_eq!(results[0]["available_copies"], 2);
}

#[tokio::test]
async fn test_search_shows_unknown_or_expected_date() {
    let w = setup_world().await;

    send(
        &w.app,
        Method::POST,
        "/books",
        Some(&w.admin),
        Some(json!({ "isbn": "111", "library_id": w.library_id, "total_copies": 1, "title": "Dune" })),
    )
    .await;
    let (status, record) = send(
        &w.app,
        Method::POST,
        "/issues/books/111",
        Some(&w.admin),
        Some(json!({ "user_id": w.reader_id, "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, results) = send(&w.app, Method::GET, "/books/search", Some(&w.reader), None).await;
    assert_eq!(results[0]["available_copies"], 0);
    assert_eq!(results[0]["author"], "Unknown");
    assert_eq!(results[0]["next_available_date"], record["expected_return_date"]);

    // Issuing beyond the shelf is refused
    let (status, body) = send(
        &w.app,
        Method::POST,
        "/issues/books/111",
        Some(&w.admin),
        Some(json!({ "user_id": w.reader_id, "library_id": w.library_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_book_inventory_endpoints() {
    let w = setup_world().await;

    let add = json!({ "isbn": "222", "library_id": w.library_id, "total_copies": 2, "title": "Emma" });
    let (status, _) = send(&w.app, Method::POST, "/books", Some(&w.admin), Some(add.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, book) = send(&w.app, Method::POST, "/books", Some(&w.admin), Some(add)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["total_copies"], 4);

    let (status, book) = send(
        &w.app,
        Method::PUT,
        "/books/222",
        Some(&w.admin),
        Some(json!({ "library_id": w.library_id, "total_copies": 3, "title": "Emma", "version": "2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(book["available_copies"], 3);
    assert_eq!(book["version"], "2");

    let uri = format!("/books/222?library_id={}", w.library_id);
    let (status, body) = send(&w.app, Method::DELETE, &uri, Some(&w.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["total_copies"], 2);

    let (status, _) = send(&w.app, Method::DELETE, &uri, Some(&w.reader), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &w.app,
        Method::POST,
        "/books",
        Some(&w.owner),
        Some(json!({ "isbn": "333", "library_id": w.library_id, "total_copies": 1, "title": "Owner book" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_registration_rules() {
    let w = setup_world().await;

    // Unknown library
    let (status, body) = send(
        &w.app,
        Method::POST,
        "/admins",
        Some(&w.owner),
        Some(json!({ "name": "Bo", "email": "bo@example.org", "password": "pass", "library_ids": [999] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("999"));

    // Library the admin does not manage
    let (_, other) = send(
        &w.app,
        Method::POST,
        "/libraries",
        Some(&w.owner),
        Some(json!({ "name": "Annex" })),
    )
    .await;
    let other_id = other["id"].as_i64().unwrap();
    let (status, _) = send(
        &w.app,
        Method::POST,
        "/users",
        Some(&w.admin),
        Some(json!({ "name": "Cy", "email": "cy@example.org", "password": "pass", "library_ids": [other_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Duplicate email
    let (status, _) = send(
        &w.app,
        Method::POST,
        "/owners",
        Some(&w.owner),
        Some(json!({ "name": "Dup", "email": "RITA@example.org", "password": "pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Short password
    let (status, _) = send(
        &w.app,
        Method::POST,
        "/owners",
        Some(&w.owner),
        Some(json!({ "name": "Eve", "email": "eve@example.org", "password": "abc" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Only owners register owners
    let (status, _) = send(
        &w.app,
        Method::POST,
        "/owners",
        Some(&w.admin),
        Some(json!({ "name": "Fay", "email": "fay@example.org", "password": "pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, libraries) = send(&w.app, Method::GET, "/libraries", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(libraries.as_array().unwrap().len(), 2);
}
