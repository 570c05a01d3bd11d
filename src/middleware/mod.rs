/*
 * Responsibility
 * - middleware の公開インターフェース
 * - 各モジュールは `apply(router, ...)` を提供し、app.rs で積み上げる
 */
pub mod auth;
pub mod cors;
pub mod http;
pub mod security_headers;
pub mod session;
