//! Shared helpers for the HTTP-level tests.
//!
//! The app is built from a plain key/value list instead of the process
//! environment and driven in-process with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use tower::ServiceExt;

use routegate::app::build_app;
use routegate::config::Config;
use routegate::services::session::MemorySessionStore;

pub const USERS: &str = "alice:s3cret:read|write,bob:hunter2";
pub const REALM: &str = "routegate-test";

pub fn config(extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("AUTH_USERS".to_string(), USERS.to_string()),
        ("AUTH_REALM".to_string(), REALM.to_string()),
        ("DIGEST_SECRET".to_string(), "digest-test-secret".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert((*k).to_string(), (*v).to_string());
    }

    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config")
}

pub fn app(extra: &[(&str, &str)]) -> Router {
    build_app(&config(extra), Arc::new(MemorySessionStore::new())).expect("app builds")
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> &str {
        self.header("location").expect("location header")
    }

    /// `name=value` of the session cookie set by this response, if any.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("sid="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("json body")
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let resp = app.clone().oneshot(req).await.expect("infallible router");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body");

    TestResponse {
        status,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub async fn get(app: &Router, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    send(app, builder.body(Body::empty()).expect("request")).await
}

/// Pull one `key="value"` (or bare `key=value`) parameter out of a challenge.
pub fn challenge_param(challenge: &str, key: &str) -> Option<String> {
    challenge
        .split_once(' ')
        .map(|(_, params)| params)
        .unwrap_or(challenge)
        .split(',')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().trim_matches('"').to_string())
}
