//! Session cookie → `Session` in request extensions.
//!
//! Responsibility:
//! - Read the session id cookie, or mint a new one (UUID v4) when the store
//!   does not know it.
//! - Hand the request a `Session` bound to the configured store.
//! - Set the cookie on the response when the id was minted here or
//!   regenerated by a handler (login).
//!
//! Auth handlers that need a session (redirect, OAuth2) fail closed when this
//! layer is missing.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

use crate::services::session::{Session, SessionStore};

#[derive(Clone)]
pub struct SessionLayerConfig {
    pub store: Arc<dyn SessionStore>,
    pub cookie_name: String,
    pub ttl: Duration,
    // `Secure` cookie attribute; on in production
    pub secure: bool,
}

impl std::fmt::Debug for SessionLayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLayerConfig")
            .field("backend", &self.store.backend_name())
            .field("cookie_name", &self.cookie_name)
            .field("ttl", &self.ttl)
            .field("secure", &self.secure)
            .finish()
    }
}

pub fn apply<S>(router: Router<S>, config: SessionLayerConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(config, session_middleware))
}

async fn session_middleware(
    State(config): State<SessionLayerConfig>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let presented = jar
        .get(&config.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| Uuid::parse_str(v).is_ok());

    // Only ids the store already holds data for are honoured; anything else
    // (never issued, expired, destroyed) gets a fresh id.
    let existing = match presented {
        Some(id) => match config.store.exists(&id).await {
            Ok(true) => Some(id),
            Ok(false) => None,
            Err(e) => {
                tracing::error!(error = %e, "session lookup failed; issuing a new session id");
                None
            }
        },
        None => None,
    };

    let (session_id, minted) = match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let session = Session::new(session_id, config.store.clone(), config.ttl);
    req.extensions_mut().insert(session.clone());

    let response = next.run(req).await;
    if !minted && !session.is_regenerated() {
        return response;
    }

    // A handler may have regenerated the id after login.
    let cookie = Cookie::build((config.cookie_name.clone(), session.id()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure)
        .build();

    (jar.add(cookie), response).into_response()
}
