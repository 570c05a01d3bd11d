mod common;

use axum::http::StatusCode;

use common::{app, get};

#[tokio::test]
async fn greeting_defaults_to_first_offer_without_preferences() {
    let app = app(&[]);
    let resp = get(&app, "/api/v1/greeting", &[]).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("content-type"), Some("application/json"));
    assert_eq!(resp.header("content-language"), Some("en"));
    assert_eq!(resp.json()["greeting"], "Hello");
    assert!(resp.header("vary").unwrap().contains("accept-language"));
}

#[tokio::test]
async fn greeting_follows_weighted_preferences() {
    let app = app(&[]);
    let resp = get(
        &app,
        "/api/v1/greeting",
        &[
            ("accept", "application/json;q=0.2, text/plain;q=0.8, */*;q=0.1"),
            ("accept-language", "de, fr;q=0.9, en;q=0.5"),
        ],
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("content-type"), Some("text/plain; charset=utf-8"));
    assert_eq!(resp.header("content-language"), Some("fr"));
    assert_eq!(resp.body, "Bonjour\n");
}

#[tokio::test]
async fn more_specific_range_beats_wildcard_at_equal_quality() {
    let app = app(&[]);
    let resp = get(
        &app,
        "/api/v1/greeting",
        &[("accept", "*/*, text/html"), ("accept-language", "ja-JP, ja")],
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(resp.header("content-language"), Some("ja"));
    assert!(resp.body.contains("こんにちは"));
}

#[tokio::test]
async fn nothing_acceptable_is_406() {
    let app = app(&[]);

    let resp = get(&app, "/api/v1/greeting", &[("accept", "image/png")]).await;
    assert_eq!(resp.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(resp.json()["error"]["code"], "NOT_ACCEPTABLE");

    let resp = get(&app, "/api/v1/greeting", &[("accept-charset", "iso-8859-1")]).await;
    assert_eq!(resp.status, StatusCode::NOT_ACCEPTABLE);

    let resp = get(
        &app,
        "/api/v1/greeting",
        &[("accept-language", "*;q=0")],
    )
    .await;
    assert_eq!(resp.status, StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn health_is_public() {
    let app = app(&[]);
    let resp = get(&app, "/health", &[]).await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
    assert!(resp.header("x-request-id").is_some());
}
