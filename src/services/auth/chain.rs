use std::sync::Arc;

use async_trait::async_trait;

use crate::services::auth::handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, authorize,
};

/// Tries handlers in order until one authenticates the request.
///
/// - A `401`-class failure moves on to the next handler.
/// - A redirect is remembered and returned only if nobody authenticates.
/// - Anything else (forbidden, misconfiguration, backend failure) stops the chain.
///
/// Each member's own required authorities are enforced when it succeeds.
pub struct ChainAuthHandler {
    handlers: Vec<Arc<dyn AuthHandler>>,
    authorities: Authorities,
}

impl std::fmt::Debug for ChainAuthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemes: Vec<_> = self.handlers.iter().map(|h| h.scheme()).collect();
        f.debug_struct("ChainAuthHandler")
            .field("handlers", &schemes)
            .field("authorities", &self.authorities)
            .finish()
    }
}

impl Default for ChainAuthHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainAuthHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            authorities: Authorities::default(),
        }
    }

    pub fn append(mut self, handler: Arc<dyn AuthHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl AuthHandler for ChainAuthHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Chain
    }

    fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    fn authorities_mut(&mut self) -> &mut Authorities {
        &mut self.authorities
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError> {
        let mut redirect = None;
        let mut last_unauthenticated = None;

        for handler in &self.handlers {
            match handler.handle(req).await {
                Ok(AuthOutcome::Proceed(principal)) => {
                    authorize(handler.authorities(), &principal)?;
                    tracing::debug!(scheme = %handler.scheme(), "chain member authenticated");
                    return Ok(AuthOutcome::Proceed(principal));
                }
                Ok(AuthOutcome::Redirect(url)) => {
                    redirect.get_or_insert(url);
                }
                Err(err) if err.status() == axum::http::StatusCode::UNAUTHORIZED => {
                    tracing::trace!(scheme = %handler.scheme(), error = %err, "chain member declined");
                    last_unauthenticated = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(url) = redirect {
            return Ok(AuthOutcome::Redirect(url));
        }

        Err(last_unauthenticated
            .unwrap_or_else(|| AuthError::unauthenticated("no authentication handler accepted the request")))
    }
}
