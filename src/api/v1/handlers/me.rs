/*
 * Responsibility
 * - GET /api/v1/{basic,digest,jwt,portal,any,oauth2}/me
 * - guard middleware が通した認証済みコンテキストをそのまま返す
 */
use axum::Json;

use crate::api::v1::extractors::{AuthCtx, AuthCtxExtractor};

pub async fn me(AuthCtxExtractor(ctx): AuthCtxExtractor) -> Json<AuthCtx> {
    Json(ctx)
}
