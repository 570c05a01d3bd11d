use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::services::auth::credentials::CredentialStore;
use crate::services::auth::handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, Principal,
};

/// HTTP Basic authentication (RFC 7617) against a [`CredentialStore`].
pub struct BasicAuthHandler {
    credentials: Arc<dyn CredentialStore>,
    realm: String,
    authorities: Authorities,
}

impl std::fmt::Debug for BasicAuthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthHandler")
            .field("realm", &self.realm)
            .field("authorities", &self.authorities)
            .finish_non_exhaustive()
    }
}

impl BasicAuthHandler {
    pub fn new(credentials: Arc<dyn CredentialStore>, realm: impl Into<String>) -> Self {
        Self {
            credentials,
            realm: realm.into(),
            authorities: Authorities::default(),
        }
    }

    fn challenge(&self, reason: &str) -> AuthError {
        AuthError::challenge(
            reason,
            format!("Basic realm=\"{}\", charset=\"UTF-8\"", self.realm),
        )
    }
}

/// Decode the `user:password` pair of a Basic credential.
fn decode_credentials(encoded: &str) -> Result<(String, String), &'static str> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| "invalid base64 in basic credentials")?;

    let decoded = String::from_utf8(decoded).map_err(|_| "invalid utf-8 in basic credentials")?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or("basic credentials must be user:password")?;

    Ok((username.to_string(), password.to_string()))
}

#[async_trait]
impl AuthHandler for BasicAuthHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Basic
    }

    fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    fn authorities_mut(&mut self) -> &mut Authorities {
        &mut self.authorities
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError> {
        let encoded = req
            .authorization("Basic")
            .ok_or_else(|| self.challenge("missing basic credentials"))?;

        let (username, password) =
            decode_credentials(encoded).map_err(|reason| self.challenge(reason))?;

        let Some(user) = self.credentials.verify(&username, &password).await else {
            tracing::info!(username = %username, "basic authentication failed");
            return Err(self.challenge("invalid username or password"));
        };

        tracing::debug!(username = %user.username, "authenticated via basic");

        Ok(AuthOutcome::Proceed(Principal::new(
            user.username,
            AuthScheme::Basic,
            user.authorities,
        )))
    }
}
