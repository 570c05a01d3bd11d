//! OAuth2 authorization-code flow against a wiremock token endpoint.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use routegate::services::auth::OAuth2Provider;
use routegate::services::auth::oauth2::{HttpOAuth2Provider, ProviderError};

use common::{app, get};

const PROTECTED: &str = "/api/v1/oauth2/me";

fn oauth2_app(server: &MockServer, extra: &[(&str, &str)]) -> axum::Router {
    let token_url = format!("{}/token", server.uri());
    let mut vars = vec![
        ("PUBLIC_BASE_URL", "http://app.test"),
        ("OAUTH2_CLIENT_ID", "client-1"),
        ("OAUTH2_CLIENT_SECRET", "shh"),
        ("OAUTH2_AUTHORIZE_URL", "https://idp.test/authorize"),
        ("OAUTH2_TOKEN_URL", token_url.as_str()),
        ("OAUTH2_SCOPES", "profile"),
    ];
    vars.extend_from_slice(extra);
    app(&vars)
}

fn token_body() -> serde_json::Value {
    json!({
        "access_token": "at-123",
        "token_type": "Bearer",
        "expires_in": 3600,
        "scope": "profile email",
    })
}

/// Start the flow and return (session cookie, state, authorize URL).
async fn begin(app: &axum::Router) -> (String, String, Url) {
    let resp = get(app, PROTECTED, &[]).await;
    assert_eq!(resp.status, StatusCode::FOUND);

    let cookie = resp.session_cookie().expect("session cookie");
    let location = Url::parse(resp.location()).expect("absolute authorize url");
    let state = location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state param");

    (cookie, state, location)
}

#[tokio::test]
async fn full_flow_reaches_protected_route() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let app = oauth2_app(&server, &[]);
    let (cookie, state, authorize) = begin(&app).await;

    assert_eq!(authorize.host_str(), Some("idp.test"));
    let params: Vec<(String, String)> = authorize.query_pairs().into_owned().collect();
    assert!(params.contains(&("response_type".into(), "code".into())));
    assert!(params.contains(&("client_id".into(), "client-1".into())));
    assert!(params.contains(&(
        "redirect_uri".into(),
        "http://app.test/oauth2/callback".into()
    )));
    assert!(params.contains(&("scope".into(), "profile".into())));

    let callback = format!("/oauth2/callback?code=abc&state={state}");
    let resp = get(&app, &callback, &[("cookie", &cookie)]).await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert_eq!(resp.location(), PROTECTED);
    let signed_in = resp.session_cookie().expect("session id reissued on login");
    assert_ne!(signed_in, cookie);

    let resp = get(&app, PROTECTED, &[("cookie", &signed_in)]).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["scheme"], "oauth2");
    assert!(body["subject"].as_str().unwrap().starts_with("oauth2:"));
    assert_eq!(body["authorities"], json!(["email", "profile"]));

    // The state is single-use.
    let resp = get(&app, &callback, &[("cookie", &signed_in)]).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pre_login_session_id_is_retired_by_the_callback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(&server)
        .await;

    let app = oauth2_app(&server, &[]);
    let (pre_login, state, _) = begin(&app).await;

    let callback = format!("/oauth2/callback?code=abc&state={state}");
    let resp = get(&app, &callback, &[("cookie", &pre_login)]).await;
    assert_eq!(resp.status, StatusCode::FOUND);
    let signed_in = resp.session_cookie().expect("fresh id after login");
    assert_ne!(signed_in, pre_login);

    // Whoever still holds the old id starts a brand new flow.
    let resp = get(&app, PROTECTED, &[("cookie", &pre_login)]).await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert!(resp.location().starts_with("https://idp.test/authorize"));

    let resp = get(&app, PROTECTED, &[("cookie", &signed_in)]).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn forged_state_is_forbidden_and_never_exchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(0)
        .mount(&server)
        .await;

    let app = oauth2_app(&server, &[]);
    let (cookie, _state, _) = begin(&app).await;

    let resp = get(
        &app,
        "/oauth2/callback?code=abc&state=forged",
        &[("cookie", &cookie)],
    )
    .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.json()["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn callback_without_pending_flow_is_forbidden() {
    let server = MockServer::start().await;
    let app = oauth2_app(&server, &[]);

    let resp = get(&app, "/oauth2/callback?code=abc&state=whatever", &[]).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn provider_denial_is_unauthorized() {
    let server = MockServer::start().await;
    let app = oauth2_app(&server, &[]);
    let (cookie, state, _) = begin(&app).await;

    let callback = format!("/oauth2/callback?error=access_denied&state={state}");
    let resp = get(&app, &callback, &[("cookie", &cookie)]).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_endpoint_rejection_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .mount(&server)
        .await;

    let app = oauth2_app(&server, &[]);
    let (cookie, state, _) = begin(&app).await;

    let callback = format!("/oauth2/callback?code=stale&state={state}");
    let resp = get(&app, &callback, &[("cookie", &cookie)]).await;
    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);

    // A failed flow starts over on the next visit.
    let resp = get(&app, PROTECTED, &[("cookie", &cookie)]).await;
    assert_eq!(resp.status, StatusCode::FOUND);
    assert!(resp.location().starts_with("https://idp.test/authorize"));
}

#[tokio::test]
async fn slow_token_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let app = oauth2_app(&server, &[("OAUTH2_EXCHANGE_TIMEOUT_SECONDS", "1")]);
    let (cookie, state, _) = begin(&app).await;

    let callback = format!("/oauth2/callback?code=abc&state={state}");
    let resp = get(&app, &callback, &[("cookie", &cookie)]).await;
    assert_eq!(resp.status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn provider_sends_client_credentials_with_basic_auth() {
    let server = MockServer::start().await;
    let expected = format!("Basic {}", STANDARD.encode("client-1:shh"));
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("authorization", expected.as_str()))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains(
            "redirect_uri=https%3A%2F%2Fapp.test%2Fcb",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpOAuth2Provider::new(
        "client-1",
        Some("shh".to_string()),
        "https://idp.test/authorize",
        &format!("{}/token", server.uri()),
    )
    .unwrap();

    let tokens = provider.get_token("abc", "https://app.test/cb").await.unwrap();
    assert_eq!(tokens.access_token, "at-123");
    assert_eq!(tokens.expires_in, Some(3600));
    assert_eq!(tokens.scope.as_deref(), Some("profile email"));
}

#[tokio::test]
async fn provider_surfaces_rfc6749_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code expired",
        })))
        .mount(&server)
        .await;

    let provider = HttpOAuth2Provider::new(
        "client-1",
        None,
        "https://idp.test/authorize",
        &format!("{}/token", server.uri()),
    )
    .unwrap();

    let err = provider.get_token("abc", "https://app.test/cb").await.unwrap_err();
    match err {
        ProviderError::Rejected {
            status,
            error,
            description,
        } => {
            assert_eq!(status, 400);
            assert_eq!(error, "invalid_grant");
            assert_eq!(description.as_deref(), Some("code expired"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn provider_rejects_token_response_without_access_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
        .mount(&server)
        .await;

    let provider = HttpOAuth2Provider::new(
        "client-1",
        None,
        "https://idp.test/authorize",
        &format!("{}/token", server.uri()),
    )
    .unwrap();

    let err = provider.get_token("abc", "https://app.test/cb").await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}
