//! Auth handler → request guard.
//!
//! Runs an `AuthHandler` before the wrapped routes and turns its decision into
//! HTTP:
//! - `Proceed` → required-authority check → `AuthCtx` in extensions → next
//! - `Redirect` → `302 Found`
//! - error → `AppError` (401 + `WWW-Authenticate`, 403, 502, 500)
//!
//! ```ignore
//! let me = Router::new().route("/basic/me", get(me));
//! let me = middleware::auth::guard::apply(me, basic_handler);
//! ```

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::{AuthHandler, AuthOutcome, AuthRequest, authorize};
use crate::services::session::Session;

pub fn apply<S>(router: Router<S>, handler: Arc<dyn AuthHandler>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // route_layer: unmatched paths still 404 instead of challenging
    router.route_layer(middleware::from_fn_with_state(handler, guard_middleware))
}

async fn guard_middleware(
    State(handler): State<Arc<dyn AuthHandler>>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = req.extensions().get::<Session>().cloned();

    let outcome = {
        let auth_req = AuthRequest {
            method: req.method(),
            uri: &original_uri,
            headers: req.headers(),
            session: session.as_ref(),
        };
        handler.handle(&auth_req).await?
    };

    match outcome {
        AuthOutcome::Proceed(principal) => {
            authorize(handler.authorities(), &principal)?;

            tracing::info!(
                subject = %principal.subject,
                scheme = %principal.scheme,
                path = %original_uri.path(),
                "request authenticated"
            );

            req.extensions_mut().insert(AuthCtx::from(principal));
            Ok(next.run(req).await)
        }
        AuthOutcome::Redirect(location) => found(&location),
    }
}

fn found(location: &str) -> Result<Response, AppError> {
    let value = HeaderValue::from_str(location).map_err(|_| {
        tracing::error!(location = %location, "redirect target is not a valid header value");
        AppError::Internal
    })?;

    Ok((StatusCode::FOUND, [(header::LOCATION, value)]).into_response())
}
