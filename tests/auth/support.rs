#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, Response, StatusCode},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use warden::{
    api::{build_router, ApiState},
    auth::{principal::CreatePrincipalRequest, Principal, PresenceTracker, TokenCodec},
    config::{AuthConfig, ServerConfig},
    domain::PrincipalId,
    notify::{Notifier, PasswordResetNotice},
    storage::Repositories,
};

pub const STRONG_PASSWORD: &str = "Str0ng!Pass";

/// Captures reset notices so tests can read the link that would have been mailed.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<PasswordResetNotice>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_password_reset(&self, notice: &PasswordResetNotice) -> warden::Result<()> {
        let _ = self.tx.send(notice.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: ApiState,
    pub repositories: Repositories,
    server: ServerConfig,
    notices: Mutex<mpsc::UnboundedReceiver<PasswordResetNotice>>,
    _presence_rx: mpsc::Receiver<PrincipalId>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.server)
    }

    /// Provision a principal directly through the store.
    pub async fn create_principal(&self, body: Value) -> Principal {
        let request: CreatePrincipalRequest =
            serde_json::from_value(body).expect("valid create request");
        self.state.store.create(request, None).await.expect("create principal")
    }

    pub async fn create_with_role(&self, username: &str, role: &str) -> Principal {
        self.create_principal(json!({
            "username": username,
            "full_name": format!("{} tester", username),
            "password": STRONG_PASSWORD,
            "role": role,
            "emails": [format!("{}@example.com", username)]
        }))
        .await
    }

    /// Log in over HTTP and return the bearer token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = send_request(
            self,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK, "login as {}", username);
        let body: Value = read_json(response).await;
        body["token"].as_str().expect("token in login response").to_string()
    }

    /// Wait for the next reset notice delivered by the background send.
    pub async fn next_notice(&self) -> PasswordResetNotice {
        let mut rx = self.notices.lock().await;
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("notice delivered in time")
            .expect("notifier channel open")
    }

    /// Assert that no notice arrives within a short window.
    pub async fn assert_no_notice(&self) {
        let mut rx = self.notices.lock().await;
        let outcome = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(outcome.is_err(), "unexpected reset notice: {:?}", outcome);
    }
}

pub async fn setup_test_app() -> TestApp {
    let repositories = Repositories::in_memory();
    let auth = AuthConfig::default();
    let codec = Arc::new(TokenCodec::new(
        b"integration-test-signing-secret-0123456789",
        auth.token_ttl(),
    ));
    let (presence, presence_rx) = PresenceTracker::channel(64);
    let (tx, rx) = mpsc::unbounded_channel();

    let state = ApiState::new(
        &repositories,
        codec,
        presence,
        Arc::new(RecordingNotifier { tx }),
        &auth,
        None,
    );

    TestApp {
        state,
        repositories,
        server: ServerConfig::default(),
        notices: Mutex::new(rx),
        _presence_rx: presence_rx,
    }
}

pub async fn send_request(
    app: &TestApp,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = if let Some(json) = body {
        let bytes = serde_json::to_vec(&json).expect("serialize body");
        builder
            .header("content-type", "application/json")
            .body(Body::from(bytes))
            .expect("build request")
    } else {
        builder.body(Body::empty()).expect("build request")
    };

    app.router().oneshot(request).await.expect("request")
}

pub async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}
