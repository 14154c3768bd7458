//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::util::ServiceExt;

use peerpay::api::{self, AppState};
use peerpay::domain::{Balance, UserId};
use peerpay::engine::EngineOptions;
use peerpay::identity::StaticDirectory;
use peerpay::store::{AccountStore, InMemoryStorage};

pub fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

/// Full router over in-memory storage, plus handles for inspection
pub struct TestApp {
    pub router: Router,
    pub storage: InMemoryStorage,
    pub directory: StaticDirectory,
}

pub async fn memory_app(accounts: &[(&str, i64)]) -> TestApp {
    let storage = InMemoryStorage::new();
    for (id, balance) in accounts {
        storage
            .open_account(&user(id), Balance::new(*balance).unwrap())
            .await
            .unwrap();
    }
    let directory = StaticDirectory::new();
    let state = AppState::new(
        storage.clone(),
        Arc::new(directory.clone()),
        EngineOptions::default(),
    );

    TestApp {
        router: api::build_router(state),
        storage,
        directory,
    }
}

impl TestApp {
    pub async fn balance(&self, id: &str) -> i64 {
        self.storage.get_balance(&user(id)).await.unwrap().units()
    }
}

pub fn get(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-Request-User-Id", user_id)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, user_id: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Request-User-Id", user_id)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send a request and decode the JSON body (Null if the body is not JSON)
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Connect to DATABASE_URL and apply the schema
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = peerpay::db::connect(&database_url, 5)
        .await
        .expect("Failed to connect to DB");
    peerpay::db::apply_schema(&pool)
        .await
        .expect("Failed to apply schema");
    pool
}

/// Unique id so parallel tests never share accounts
pub fn unique_user(prefix: &str) -> UserId {
    user(&format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()))
}

/// Insert a directory entry
pub async fn seed_user(pool: &PgPool, user_id: &UserId, first: &str, last: &str) {
    sqlx::query(
        r#"
        INSERT INTO users (user_id, first_name, last_name, email)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE
            SET first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                updated_at = NOW()
        "#,
    )
    .bind(user_id.as_str())
    .bind(first)
    .bind(last)
    .bind(format!("{}@example.test", user_id))
    .execute(pool)
    .await
    .expect("Failed to seed user");
}
