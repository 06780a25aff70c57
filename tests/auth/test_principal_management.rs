use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::support::{read_json, send_request, setup_test_app, STRONG_PASSWORD};

#[tokio::test]
async fn admin_creates_lists_and_deletes_principals() {
    let app = setup_test_app().await;
    let admin = app.create_with_role("root", "admin").await;
    let token = app.login("root", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/principals",
        Some(&token),
        Some(json!({
            "username": "new.hire",
            "full_name": "New Hire",
            "role": "user",
            "emails": ["new.hire@example.com"]
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = read_json(response).await;
    assert_eq!(created["is_first_login"], true);
    assert_eq!(created["created_by"], admin.id.get());
    let created_id = created["id"].as_i64().expect("id");

    let response = send_request(&app, Method::GET, "/api/v1/principals", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page: Value = read_json(response).await;
    assert_eq!(page["total"], 2);

    let response = send_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/principals/{}", created_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/principals/{}", created_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    app.create_with_role("taken", "user").await;
    let token = app.login("root", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/principals",
        Some(&token),
        Some(json!({ "username": "taken", "full_name": "Second Taken", "role": "user" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_cannot_delete_self() {
    let app = setup_test_app().await;
    let admin = app.create_with_role("root", "admin").await;
    let token = app.login("root", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::DELETE,
        &format!("/api/v1/principals/{}", admin.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn standard_principal_cannot_reach_management_endpoints() {
    let app = setup_test_app().await;
    let other = app.create_with_role("other", "user").await;
    app.create_with_role("plain", "user").await;
    let token = app.login("plain", STRONG_PASSWORD).await;

    let response = send_request(&app, Method::GET, "/api/v1/principals", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/principals",
        Some(&token),
        Some(json!({ "username": "sneaky", "full_name": "Sneaky", "role": "admin" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/principals/{}", other.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", other.id),
        Some(&token),
        Some(json!({ "full_name": "Hijacked" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn standard_self_edit_rejects_privileged_fields() {
    let app = setup_test_app().await;
    let me = app.create_with_role("plain", "user").await;
    let token = app.login("plain", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", me.id),
        Some(&token),
        Some(json!({ "role": "admin", "available_organizations": [3] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = read_json(response).await;
    let errors = body["errors"].as_array().expect("violations listed");
    assert_eq!(errors.len(), 2);

    // The rejected request left the role untouched and the session alive.
    let response = send_request(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["role"], "user");
}

#[tokio::test]
async fn moderator_sees_only_accessible_targets() {
    let app = setup_test_app().await;
    let visible = app.create_with_role("visible", "user").await;
    let hidden = app.create_with_role("hidden", "user").await;
    app.create_principal(json!({
        "username": "mod",
        "full_name": "Moderator",
        "password": STRONG_PASSWORD,
        "role": "moderator",
        "accessible_users": [visible.id]
    }))
    .await;
    let token = app.login("mod", STRONG_PASSWORD).await;

    let response = send_request(&app, Method::GET, "/api/v1/principals", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page: Value = read_json(response).await;
    let usernames: Vec<&str> = page["principals"]
        .as_array()
        .expect("principals")
        .iter()
        .filter_map(|p| p["username"].as_str())
        .collect();
    assert_eq!(usernames, vec!["visible"]);

    let response = send_request(
        &app,
        Method::GET,
        &format!("/api/v1/principals/{}", hidden.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn moderator_on_accessible_target_only_sets_organizations() {
    let app = setup_test_app().await;
    let target = app.create_with_role("member", "user").await;
    app.create_principal(json!({
        "username": "mod",
        "full_name": "Moderator",
        "password": STRONG_PASSWORD,
        "role": "moderator",
        "accessible_users": [target.id]
    }))
    .await;
    let token = app.login("mod", STRONG_PASSWORD).await;
    let member_token = app.login("member", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", target.id),
        Some(&token),
        Some(json!({ "full_name": "Renamed By Mod", "available_organizations": [5, 9] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["available_organizations"], json!([5, 9]));
    assert_eq!(body["full_name"], "member tester");

    // Organization changes do not revoke the member's sessions.
    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some(&member_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn moderator_cannot_promote_to_admin_or_touch_strangers() {
    let app = setup_test_app().await;
    let target = app.create_with_role("member", "user").await;
    let stranger = app.create_with_role("stranger", "user").await;
    app.create_principal(json!({
        "username": "mod",
        "full_name": "Moderator",
        "password": STRONG_PASSWORD,
        "role": "moderator",
        "accessible_users": [target.id]
    }))
    .await;
    let token = app.login("mod", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", target.id),
        Some(&token),
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", stranger.id),
        Some(&token),
        Some(json!({ "available_organizations": [1] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_credential_reset_puts_target_back_to_first_login() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    let target = app.create_with_role("forgetful", "user").await;
    let admin_token = app.login("root", STRONG_PASSWORD).await;
    let target_token = app.login("forgetful", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", target.id),
        Some(&admin_token),
        Some(json!({ "reset_password": true })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["is_first_login"], true);
    assert_eq!(body["require_password_change"], true);

    let response =
        send_request(&app, Method::GET, "/api/v1/auth/me", Some(&target_token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Without a stored credential the next login is accepted and flags the change.
    let response = send_request(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "username": "forgetful", "password": "" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_json(response).await;
    assert_eq!(body["require_password_change"], true);
}

#[tokio::test]
async fn malformed_update_body_is_a_bad_request() {
    let app = setup_test_app().await;
    let me = app.create_with_role("plain", "user").await;
    let token = app.login("plain", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", me.id),
        Some(&token),
        Some(json!({ "no_such_field": true })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn moderator_self_edit_rejects_each_privileged_field() {
    let app = setup_test_app().await;
    let moderator = app.create_with_role("mod", "moderator").await;
    let token = app.login("mod", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", moderator.id),
        Some(&token),
        Some(json!({ "role": "admin", "username": "newmod", "password": "N3w!Secret" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = read_json(response).await;
    let errors = body["errors"].as_array().expect("violations listed");
    assert_eq!(errors.len(), 3);
    for field in ["role", "username", "password"] {
        assert!(
            errors.iter().any(|e| e.as_str().is_some_and(|e| e.starts_with(field))),
            "no violation for {}",
            field
        );
    }

    // Nothing was applied, so the old name and password still log in.
    app.login("mod", STRONG_PASSWORD).await;
}

#[tokio::test]
async fn accessible_targets_stay_administrator_assigned() {
    let app = setup_test_app().await;
    let victim = app.create_with_role("victim", "user").await;
    let moderator = app.create_with_role("mod", "moderator").await;
    let plain = app.create_with_role("plain", "user").await;
    let mod_token = app.login("mod", STRONG_PASSWORD).await;
    let plain_token = app.login("plain", STRONG_PASSWORD).await;

    let victim_path = format!("/api/v1/principals/{}", victim.id);
    let response = send_request(
        &app,
        Method::PATCH,
        &victim_path,
        Some(&mod_token),
        Some(json!({ "available_organizations": [1] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", moderator.id),
        Some(&mod_token),
        Some(json!({ "accessible_users": [victim.id] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The refused self-edit granted nothing.
    let response = send_request(
        &app,
        Method::PATCH,
        &victim_path,
        Some(&mod_token),
        Some(json!({ "available_organizations": [1] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let stored = app.state.store.principals().get(moderator.id).await.expect("read");
    assert!(stored.expect("moderator exists").accessible_users.is_empty());

    let response = send_request(
        &app,
        Method::PATCH,
        &format!("/api/v1/principals/{}", plain.id),
        Some(&plain_token),
        Some(json!({ "accessible_users": [1, 2, 3] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn page_past_the_end_is_empty_not_an_error() {
    let app = setup_test_app().await;
    app.create_with_role("root", "admin").await;
    app.create_with_role("other", "user").await;
    let token = app.login("root", STRONG_PASSWORD).await;

    let response = send_request(
        &app,
        Method::GET,
        "/api/v1/principals?page=9223372036854775807",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let page: Value = read_json(response).await;
    assert_eq!(page["total"], 2);
    assert_eq!(page["page"], i64::MAX);
    assert!(page["principals"].as_array().expect("principals").is_empty());
}
