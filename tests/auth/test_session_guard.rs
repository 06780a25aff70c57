use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::support::{read_json, send_request, setup_test_app, STRONG_PASSWORD};

#[tokio::test]
async fn missing_or_malformed_bearer_is_unauthorized() {
    let app = setup_test_app().await;

    let response = send_request(&app, Method::GET, "/api/v1/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some("not-a-valid-token"), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = read_json(response).await;
    assert!(body.get("force_logout").is_none());
}

#[tokio::test]
async fn authenticated_request_carries_security_headers() {
    let app = setup_test_app().await;
    app.create_with_role("alice", "user").await;
    let token = app.login("alice", STRONG_PASSWORD).await;

    let response = send_request(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body: Value = read_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["role"], "user");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn role_change_forces_logout_of_existing_sessions() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    let target = app.create_with_role("bob", "user").await;

    let admin_token = app.login("root", STRONG_PASSWORD).await;
    let bob_token = app.login("bob", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", target.id),
        Some(&admin_token),
        Some(json!({ "role": "moderator" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = read_json(response).await;
    assert_eq!(updated["role"], "moderator");

    let response = send_request(&app, Method::GET, "/api/v1/auth/me", Some(&bob_token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = read_json(response).await;
    assert_eq!(body["force_logout"], true);
    assert!(body["reason"].is_string());
    assert!(body.get("blocked").is_none());

    // A fresh login picks up the new epoch and role.
    let fresh = app.login("bob", STRONG_PASSWORD).await;
    let response = send_request(&app, Method::GET, "/api/v1/auth/me", Some(&fresh), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let me: Value = read_json(response).await;
    assert_eq!(me["role"], "moderator");
}

#[tokio::test]
async fn blocking_rejects_live_tokens_and_new_logins() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    let target = app.create_with_role("carol", "user").await;

    let admin_token = app.login("root", STRONG_PASSWORD).await;
    let carol_token = app.login("carol", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", target.id),
        Some(&admin_token),
        Some(json!({ "is_active": false, "blocked_reason": "Spamming the queue" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = read_json(response).await;
    assert_eq!(updated["is_active"], false);
    assert_eq!(updated["blocked_reason"], "Spamming the queue");

    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some(&carol_token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = read_json(response).await;
    assert_eq!(body["force_logout"], true);
    assert_eq!(body["blocked"], true);
    assert_eq!(body["reason"], "Spamming the queue");

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "carol", "password": STRONG_PASSWORD })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = read_json(response).await;
    assert_eq!(body["blocked"], true);
}

#[tokio::test]
async fn profile_edit_keeps_sessions_alive() {
    let app = setup_test_app().await;
    let me = app.create_with_role("dave", "user").await;
    let token = app.login("dave", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", me.id),
        Some(&token),
        Some(json!({ "full_name": "Dave Renamed", "position": "Engineer" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send_request(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["full_name"], "Dave Renamed");
}

#[tokio::test]
async fn change_password_revokes_old_tokens_and_returns_a_fresh_one() {
    let app = setup_test_app().await;
    app.create_with_role("erin", "user").await;
    let old_token = app.login("erin", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/change-password",
        Some(&old_token),
        Some(json!({
            "old_password": STRONG_PASSWORD,
            "new_password": "N3w!Secret",
            "confirm_password": "N3w!Secret"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    let new_token = body["token"].as_str().expect("new token").to_string();

    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some(&old_token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some(&new_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.login("erin", "N3w!Secret").await;
}

#[tokio::test]
async fn change_password_with_wrong_current_password_is_rejected() {
    let app = setup_test_app().await;
    app.create_with_role("frank", "user").await;
    let token = app.login("frank", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/change-password",
        Some(&token),
        Some(json!({
            "old_password": "Wr0ng!Pass",
            "new_password": "N3w!Secret",
            "confirm_password": "N3w!Secret"
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing changed, so the session survives.
    let response = send_request(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = setup_test_app().await;
    app.create_with_role("grace", "user").await;

    let wrong = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "grace", "password": "Wr0ng!Pass" })),
    )
    .await;
    let unknown = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": "Wr0ng!Pass" })),
    )
    .await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let wrong: Value = read_json(wrong).await;
    let unknown: Value = read_json(unknown).await;
    assert_eq!(wrong["message"], unknown["message"]);
}

#[tokio::test]
async fn public_endpoints_need_no_token() {
    let app = setup_test_app().await;

    let response = send_request(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["database"], "in_memory");

    let response = send_request(&app, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = read_json(response).await;
    assert!(doc["paths"]["/api/v1/auth/login"].is_object());
}
