//! API Integration Tests
//!
//! Exercise the full router (middleware included) over in-memory storage.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::json;
use tower::util::ServiceExt;

use peerpay::store::Fault;

mod common;

use common::{get, memory_app, post_json, send, user};

#[tokio::test]
async fn test_health_requires_no_identity() {
    let app = memory_app(&[]).await;

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_missing_identity_is_unauthenticated() {
    let app = memory_app(&[("alice", 100)]).await;

    let request = Request::builder()
        .uri("/api/v1/account/balance")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unauthenticated");
}

#[tokio::test]
async fn test_get_balance() {
    let app = memory_app(&[("alice", 1000)]).await;
    app.directory.set_name(&user("alice"), "Alice Liddell");

    let (status, body) = send(&app.router, get("/api/v1/account/balance", "alice")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["balance"], 1000);
    assert_eq!(body["display_name"], "Alice Liddell");
}

#[tokio::test]
async fn test_balance_without_account() {
    let app = memory_app(&[]).await;

    let (status, body) = send(&app.router, get("/api/v1/account/balance", "nobody")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "account_not_found");
}

#[tokio::test]
async fn test_transfer_e2e() {
    let app = memory_app(&[("alice", 1000), ("bob", 50), ("carol", 0)]).await;

    // 1. Transfer
    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/account/transfer",
            "alice",
            &json!({ "to": "bob", "amount": 200, "note": "rent" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "transfer failed: {body}");
    assert_eq!(body["sender_id"], "alice");
    assert_eq!(body["receiver_id"], "bob");
    assert_eq!(body["amount"], 200);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["replayed"], false);
    let transfer_id = body["transfer_id"].as_str().unwrap().to_string();

    // 2. Balances
    assert_eq!(app.balance("alice").await, 800);
    assert_eq!(app.balance("bob").await, 250);

    // 3. Both histories
    let (status, body) = send(&app.router, get("/api/v1/account/transactions", "alice")).await;
    assert_eq!(status, StatusCode::OK);
    let sent = body["transactions"].as_array().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["id"], transfer_id.as_str());
    assert_eq!(sent[0]["direction"], "sent");
    assert_eq!(sent[0]["counterparty_id"], "bob");
    assert_eq!(sent[0]["note"], "rent");

    let (_, body) = send(&app.router, get("/api/v1/account/transactions", "bob")).await;
    let received = body["transactions"].as_array().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["direction"], "received");
    assert_eq!(received[0]["amount"], 200);

    // 4. Transfer lookup is limited to participants
    let uri = format!("/api/v1/transfers/{}", transfer_id);
    let (status, body) = send(&app.router, get(&uri, "bob")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], transfer_id.as_str());
    assert!(body.get("request_hash").is_none());

    let (status, body) = send(&app.router, get(&uri, "carol")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "transfer_not_found");
}

#[tokio::test]
async fn test_transfer_insufficient_funds() {
    let app = memory_app(&[("alice", 50), ("bob", 0)]).await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/account/transfer",
            "alice",
            &json!({ "to": "bob", "amount": 200 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(app.balance("alice").await, 50);
}

#[tokio::test]
async fn test_transfer_unknown_recipient() {
    let app = memory_app(&[("alice", 100)]).await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/account/transfer",
            "alice",
            &json!({ "to": "nonexistent-id", "amount": 50 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "unknown_recipient");
    assert_eq!(body["details"], "nonexistent-id");
}

#[tokio::test]
async fn test_transfer_rejects_bad_requests() {
    let app = memory_app(&[("alice", 100), ("bob", 0)]).await;

    let cases = [
        json!({ "to": "alice", "amount": 50 }),
        json!({ "to": "bob", "amount": 0 }),
        json!({ "to": "bob", "amount": "0.5" }),
        json!({ "to": "bob", "amount": "ten" }),
        json!({ "to": "", "amount": 5 }),
        json!({ "to": "bob" }),
        json!({ "to": "bob", "amount": 5, "from": "carol" }),
    ];

    for case in cases {
        let (status, body) = send(
            &app.router,
            post_json("/api/v1/account/transfer", "alice", &case),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
        assert_eq!(body["error_code"], "invalid_request", "{case}");
    }

    assert_eq!(app.balance("alice").await, 100);
    assert_eq!(app.storage.transfer_count(), 0);
}

#[tokio::test]
async fn test_transfer_amount_is_floored() {
    let app = memory_app(&[("alice", 1000), ("bob", 0)]).await;

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/account/transfer",
            "alice",
            &json!({ "to": "bob", "amount": "99.7" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["amount"], 99);
    assert_eq!(app.balance("bob").await, 99);
}

#[tokio::test]
async fn test_idempotency_api() {
    let app = memory_app(&[("alice", 1000), ("bob", 0)]).await;
    let payload = json!({ "to": "bob", "amount": 100 });

    let request = |body: &serde_json::Value| {
        let mut request = post_json("/api/v1/account/transfer", "alice", body);
        request
            .headers_mut()
            .insert("Idempotency-Key", "invoice-42".parse().unwrap());
        request
    };

    let (status, first) = send(&app.router, request(&payload)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = send(&app.router, request(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["replayed"], true);
    assert_eq!(second["transfer_id"], first["transfer_id"]);
    assert_eq!(app.balance("alice").await, 900);

    let (status, body) = send(&app.router, request(&json!({ "to": "bob", "amount": 101 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "idempotency_conflict");
    assert_eq!(app.storage.transfer_count(), 1);
}

#[tokio::test]
async fn test_storage_fault_is_service_unavailable() {
    let app = memory_app(&[("alice", 1000), ("bob", 0)]).await;
    app.storage.inject_fault(Fault::FailCommit);

    let (status, body) = send(
        &app.router,
        post_json(
            "/api/v1/account/transfer",
            "alice",
            &json!({ "to": "bob", "amount": 100 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "aborted");
    assert_eq!(app.balance("alice").await, 1000);
    assert_eq!(app.storage.transfer_count(), 0);
}

#[tokio::test]
async fn test_transactions_limit() {
    let app = memory_app(&[("alice", 1000), ("bob", 0)]).await;
    for amount in [1, 2, 3] {
        let (status, _) = send(
            &app.router,
            post_json(
                "/api/v1/account/transfer",
                "alice",
                &json!({ "to": "bob", "amount": amount }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app.router, get("/api/v1/account/transactions?limit=2", "bob")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["transactions"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["amount"], 3);
    assert_eq!(entries[1]["amount"], 2);

    let (status, body) = send(
        &app.router,
        get("/api/v1/account/transactions?limit=lots", "bob"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_transfer_lookup_with_malformed_id() {
    let app = memory_app(&[("alice", 10)]).await;

    let (status, body) = send(&app.router, get("/api/v1/transfers/not-a-uuid", "alice")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let app = memory_app(&[("alice", 10)]).await;
    let correlation_id = "6f1c1d0e-3a43-4d55-9a56-2b1f7c0b9e11";

    let mut request = get("/api/v1/account/balance", "alice");
    request
        .headers_mut()
        .insert("X-Correlation-Id", correlation_id.parse().unwrap());
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-correlation-id").unwrap(),
        correlation_id
    );
}
