//! services/api/tests/common/mod.rs
//!
//! Shared harness for the API integration tests. Requests run through the
//! full router against the in-memory store, so no database or network is
//! involved.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use api_lib::config::Config;
use api_lib::notify::{NotificationJob, NotificationQueue};
use api_lib::web::{self, state::AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration, Utc};
use forum_core::memory::MemoryStore;
use forum_core::{ForumStore, PortResult, TokenVerifier, User, VerifiedIdentity};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;
use url::Url;

/// A token verifier with a fixed allow list. Tokens registered with
/// [`StubVerifier::allow`] verify to their identity; everything else fails.
pub struct StubVerifier {
    identities: Mutex<HashMap<String, VerifiedIdentity>>,
}

impl StubVerifier {
    pub fn new() -> Self {
        Self { identities: Mutex::new(HashMap::new()) }
    }

    pub fn allow(&self, token: &str, identity: VerifiedIdentity) {
        self.identities
            .lock()
            .expect("stub verifier lock")
            .insert(token.to_string(), identity);
    }
}

#[async_trait]
impl TokenVerifier for StubVerifier {
    async fn verify(&self, id_token: &str) -> PortResult<Option<VerifiedIdentity>> {
        Ok(self
            .identities
            .lock()
            .expect("stub verifier lock")
            .get(id_token)
            .cloned())
    }
}

pub fn identity(name: &str, email: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        name: name.to_string(),
        email: email.to_string(),
        profile_photo_url: format!("https://photos.test/{name}.png"),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub verifier: Arc<StubVerifier>,
    pub config: Arc<Config>,
    /// The worker side of the notification channel, kept open so tests can
    /// assert which jobs handlers enqueued.
    pub jobs: UnboundedReceiver<NotificationJob>,
}

impl TestApp {
    /// The next notification job the handlers enqueued, if any.
    pub fn next_job(&mut self) -> Option<NotificationJob> {
        self.jobs.try_recv().ok()
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().expect("bind address"),
        database_url: "postgres://unused".to_string(),
        log_level: tracing::Level::INFO,
        cors_origin: "http://localhost:3000".to_string(),
        google_client_id: "test-client-id".to_string(),
        page_size: 10,
        question_preview_length: 80,
        own_answer_preview_length: 80,
        frontend_oauth_response_url: Url::parse("http://frontend.test/oauth")
            .expect("frontend url"),
        new_answer_url_template: "http://frontend.test/questions/{questionId}#{answerId}"
            .to_string(),
        new_reply_url_template:
            "http://frontend.test/questions/{questionId}/answers/{repliedToAnswerId}#{answerId}"
                .to_string(),
        smtp: None,
    }
}

pub fn test_app() -> TestApp {
    test_app_with(test_config())
}

pub fn test_app_with(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let verifier = Arc::new(StubVerifier::new());
    let (notifications, jobs) = NotificationQueue::new();
    let config = Arc::new(config);
    let state = Arc::new(AppState {
        store: store.clone(),
        verifier: verifier.clone(),
        notifications,
        config: config.clone(),
        listing: config.listing(),
    });
    TestApp { router: web::router(state), store, verifier, config, jobs }
}

/// Creates a user with a live session, returning the user and bearer token.
pub async fn seed_user(app: &TestApp, name: &str, email: &str) -> (User, String) {
    let user = app
        .store
        .create_user(name, email, "https://photos.test/seed.png")
        .await
        .expect("create user");
    let token = format!("session-{}", user.id);
    app.store
        .create_session(user.id, &token, Utc::now() + Duration::days(1))
        .await
        .expect("create session");
    (user, token)
}

pub fn build_request(
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

/// Sends a request and returns the raw response, for tests that inspect
/// headers.
pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.expect("response")
}

/// Sends a request and decodes the JSON response body. An empty body decodes
/// as `null`.
pub async fn request(
    app: &TestApp,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> (StatusCode, Value) {
    let response = send(app, build_request(method, path, token, body)).await;
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json response body")
    };
    (status, json)
}

pub async fn get(app: &TestApp, path: &str) -> (StatusCode, Value) {
    request(app, "GET", path, None, None).await
}

pub async fn get_auth(app: &TestApp, path: &str, token: &str) -> (StatusCode, Value) {
    request(app, "GET", path, Some(token), None).await
}

pub async fn post(
    app: &TestApp,
    path: &str,
    token: Option<&str>,
    body: &Value,
) -> (StatusCode, Value) {
    request(app, "POST", path, token, Some(body)).await
}

pub async fn put(app: &TestApp, path: &str, token: Option<&str>) -> (StatusCode, Value) {
    request(app, "PUT", path, token, None).await
}

pub async fn patch(
    app: &TestApp,
    path: &str,
    token: &str,
    body: &Value,
) -> (StatusCode, Value) {
    request(app, "PATCH", path, Some(token), Some(body)).await
}

/// Decodes the JSON payload a 302 from the auth endpoints carries in its
/// `oAuthRes` query parameter.
pub fn oauth_res_payload(response: &Response) -> Value {
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header");
    let url = Url::parse(location).expect("location url");
    let raw = url
        .query_pairs()
        .find(|(key, _)| key == "oAuthRes")
        .map(|(_, value)| value.into_owned())
        .expect("oAuthRes parameter");
    serde_json::from_str(&raw).expect("oAuthRes json")
}
