/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /greeting は認証なし (content negotiation)
 * - /<scheme>/me ごとに対応する AuthHandler の guard を route_layer で掛ける
 */
use std::sync::Arc;

use axum::{Router, routing::get};

use crate::api::v1::handlers::{greeting::greeting, me::me};
use crate::app::AuthHandlers;
use crate::middleware::auth::guard;
use crate::services::auth::AuthHandler;
use crate::state::AppState;

fn guarded(path: &str, handler: &Arc<dyn AuthHandler>) -> Router<AppState> {
    guard::apply(Router::new().route(path, get(me)), handler.clone())
}

pub fn routes(handlers: &AuthHandlers) -> Router<AppState> {
    let mut router = Router::new()
        .route("/greeting", get(greeting))
        .merge(guarded("/basic/me", &handlers.basic))
        .merge(guarded("/digest/me", &handlers.digest))
        .merge(guarded("/portal/me", &handlers.portal))
        .merge(guarded("/any/me", &handlers.any));

    if let Some(jwt) = &handlers.jwt {
        router = router.merge(guarded("/jwt/me", jwt));
    }
    if let Some(oauth2) = &handlers.oauth2 {
        router = router.merge(guarded("/oauth2/me", &oauth2.handler));
    }

    router
}
