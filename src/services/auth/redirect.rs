//! Interactive login via a login page.
//!
//! The handler itself never checks credentials: it lets through sessions that
//! already carry a principal and sends everyone else to the login page,
//! remembering where they were headed. [`form_login`] and [`logout`] back the
//! login page's form.

use std::sync::Arc;

use async_trait::async_trait;

use crate::services::auth::credentials::CredentialStore;
use crate::services::auth::handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, PRINCIPAL_KEY,
    Principal, RETURN_URL_KEY,
};
use crate::services::session::Session;

#[derive(Debug)]
pub struct RedirectAuthHandler {
    login_path: String,
    authorities: Authorities,
}

impl RedirectAuthHandler {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
            authorities: Authorities::default(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }
}

#[async_trait]
impl AuthHandler for RedirectAuthHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Redirect
    }

    fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    fn authorities_mut(&mut self) -> &mut Authorities {
        &mut self.authorities
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError> {
        let session = req.session()?;

        if let Some(principal) = session.get_json::<Principal>(PRINCIPAL_KEY).await? {
            return Ok(AuthOutcome::Proceed(principal));
        }

        session.put(RETURN_URL_KEY, req.path_and_query()).await?;
        tracing::debug!(path = %req.path(), "no session principal; redirecting to login");

        Ok(AuthOutcome::Redirect(self.login_path.clone()))
    }
}

/// Only same-origin absolute paths are honoured as post-login targets.
fn safe_return_url(candidate: Option<String>) -> String {
    candidate
        .filter(|u| u.starts_with('/') && !u.starts_with("//") && !u.contains('\\'))
        .unwrap_or_else(|| "/".to_string())
}

/// Check credentials, bind the principal to the session and return where the
/// client should go next.
pub async fn form_login(
    credentials: &Arc<dyn CredentialStore>,
    session: &Session,
    username: &str,
    password: &str,
) -> Result<String, AuthError> {
    let Some(user) = credentials.verify(username, password).await else {
        tracing::info!(username = %username, "form login failed");
        return Err(AuthError::unauthenticated("invalid username or password"));
    };

    // Fresh id before binding, so an id planted before login is worthless.
    session.regenerate().await?;

    let principal = Principal::new(user.username, AuthScheme::Redirect, user.authorities);
    session.put_json(PRINCIPAL_KEY, &principal).await?;

    let target = safe_return_url(session.get(RETURN_URL_KEY).await?);
    session.remove(RETURN_URL_KEY).await?;

    tracing::info!(username = %principal.subject, "form login succeeded");
    Ok(target)
}

pub async fn logout(session: &Session) -> Result<(), AuthError> {
    session.destroy().await?;
    Ok(())
}
