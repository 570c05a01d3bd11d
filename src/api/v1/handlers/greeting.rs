/*
 * Responsibility
 * - GET /api/v1/greeting
 * - Accept / Accept-Language / Accept-Charset で表現を選ぶ (content negotiation のデモ)
 * - 受け入れ可能な表現がなければ 406
 */
use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AppError;
use crate::services::negotiation::AcceptedHeaders;

const MEDIA_TYPES: [&str; 3] = ["application/json", "text/html", "text/plain"];
const LANGUAGES: [&str; 3] = ["en", "fr", "ja"];
const CHARSETS: [&str; 1] = ["utf-8"];

fn greeting_text(language: &str) -> &'static str {
    match language {
        "fr" => "Bonjour",
        "ja" => "こんにちは",
        _ => "Hello",
    }
}

pub async fn greeting(accepted: AcceptedHeaders) -> Result<Response, AppError> {
    let media_type = *accepted.best_media_type(&MEDIA_TYPES)?;
    let language = *accepted.best_language(&LANGUAGES)?;
    let charset = *accepted.best_charset(&CHARSETS)?;

    tracing::debug!(media_type, language, charset, "greeting negotiated");

    let text = greeting_text(language);
    let (content_type, body) = match media_type {
        "application/json" => (
            media_type.to_string(),
            json!({ "greeting": text, "language": language }).to_string(),
        ),
        "text/html" => (
            format!("{media_type}; charset={charset}"),
            format!("<!doctype html><html lang=\"{language}\"><body><p>{text}</p></body></html>"),
        ),
        _ => (format!("{media_type}; charset={charset}"), format!("{text}\n")),
    };

    let content_type = HeaderValue::from_str(&content_type).map_err(|_| AppError::Internal)?;
    let content_language = HeaderValue::from_str(language).map_err(|_| AppError::Internal)?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LANGUAGE, content_language),
            (
                header::VARY,
                HeaderValue::from_static("accept, accept-language, accept-charset"),
            ),
        ],
        body,
    )
        .into_response())
}
