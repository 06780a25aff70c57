use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use warden::auth::FORGOT_PASSWORD_MESSAGE;

use crate::support::{read_json, send_request, setup_test_app, TestApp, STRONG_PASSWORD};

async fn forgot(app: &TestApp, identity: &str) -> Value {
    let response = send_request(
        app,
        Method::POST,
        "/api/v1/auth/forgot-password",
        None,
        Some(json!({ "username_or_email": identity })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

fn token_from_link(link: &str) -> String {
    link.split("token=").nth(1).expect("token in reset link").to_string()
}

async fn validate(app: &TestApp, token: &str) -> bool {
    let response = send_request(
        app,
        Method::POST,
        "/api/v1/auth/reset-password/validate",
        None,
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    body["valid"].as_bool().expect("valid flag")
}

#[tokio::test]
async fn forgot_password_answers_identically_for_unknown_identities() {
    let app = setup_test_app().await;
    app.create_with_role("known", "user").await;

    let known = forgot(&app, "known").await;
    let _ = app.next_notice().await;
    let unknown = forgot(&app, "ghost@example.com").await;

    assert_eq!(known, unknown);
    assert_eq!(known["message"], FORGOT_PASSWORD_MESSAGE);
    app.assert_no_notice().await;
}

#[tokio::test]
async fn reset_flow_replaces_credential_and_revokes_sessions() {
    let app = setup_test_app().await;
    app.create_with_role("henry", "user").await;
    let live_token = app.login("henry", STRONG_PASSWORD).await;

    forgot(&app, "henry@example.com").await;
    let notice = app.next_notice().await;
    assert_eq!(notice.address, "henry@example.com");
    assert_eq!(notice.username, "henry");
    let token = token_from_link(&notice.reset_link);
    assert_eq!(token.len(), 64);
    assert!(validate(&app, &token).await);

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "Res3t!Done" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Single use.
    assert!(!validate(&app, &token).await);
    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "An0ther!One" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some(&live_token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.login("henry", "Res3t!Done").await;
}

#[tokio::test]
async fn completing_one_reset_invalidates_sibling_tokens() {
    let app = setup_test_app().await;
    app.create_with_role("iris", "user").await;

    forgot(&app, "iris").await;
    let first = token_from_link(&app.next_notice().await.reset_link);
    forgot(&app, "iris").await;
    let second = token_from_link(&app.next_notice().await.reset_link);
    assert_ne!(first, second);

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/reset-password",
        None,
        Some(json!({ "token": second, "new_password": "Res3t!Done" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(!validate(&app, &first).await);
}

#[tokio::test]
async fn weak_password_does_not_burn_the_token() {
    let app = setup_test_app().await;
    app.create_with_role("jack", "user").await;

    forgot(&app, "jack").await;
    let token = token_from_link(&app.next_notice().await.reset_link);

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "weak" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(response).await;
    assert!(!body["errors"].as_array().expect("password rules listed").is_empty());

    assert!(validate(&app, &token).await);
}

#[tokio::test]
async fn blocked_principal_gets_no_reset_token() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    let target = app.create_with_role("kate", "user").await;
    let admin_token = app.login("root", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", target.id),
        Some(&admin_token),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = forgot(&app, "kate").await;
    assert_eq!(body["message"], FORGOT_PASSWORD_MESSAGE);
    app.assert_no_notice().await;
}

#[tokio::test]
async fn unknown_reset_token_is_rejected() {
    let app = setup_test_app().await;

    assert!(!validate(&app, "deadbeef").await);

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/reset-password",
        None,
        Some(json!({ "token": "deadbeef", "new_password": "Res3t!Done" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_of_deleted_principal_is_rejected_as_invalid() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    let target = app.create_with_role("leaver", "user").await;
    let admin_token = app.login("root", STRONG_PASSWORD).await;

    forgot(&app, "leaver").await;
    let token = token_from_link(&app.next_notice().await.reset_link);

    let response = send_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/principals/{}", target.id),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/reset-password",
        None,
        Some(json!({ "token": token, "new_password": "Res3t!Done" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = read_json(response).await;
    assert_eq!(body["message"], "Invalid or expired reset token");
}
