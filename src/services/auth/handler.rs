//! The authentication handler contract shared by every auth strategy.
//!
//! A handler inspects one request and either lets it proceed with a
//! [`Principal`], asks the client to go elsewhere (interactive flows), or fails
//! it. Sending the response is the caller's job (see `middleware::auth::guard`).
//!
//! Handlers are configured with consuming builder methods and then frozen
//! behind `Arc<dyn AuthHandler>`; the required-authority set is never mutated
//! once requests are being served.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::session::{Session, SessionError};

/// Session key holding the principal bound by form login.
pub const PRINCIPAL_KEY: &str = "auth.principal";
/// Session key holding where to send the client after login.
pub const RETURN_URL_KEY: &str = "auth.return_url";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    Basic,
    Digest,
    Jwt,
    Redirect,
    #[serde(rename = "oauth2")]
    OAuth2,
    Chain,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Basic => "basic",
            Self::Digest => "digest",
            Self::Jwt => "jwt",
            Self::Redirect => "redirect",
            Self::OAuth2 => "oauth2",
            Self::Chain => "chain",
        };
        f.write_str(name)
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub scheme: AuthScheme,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(subject: impl Into<String>, scheme: AuthScheme, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            scheme,
            authorities: authorities.into_iter().map(Into::into).collect(),
        }
    }
}

/// Authorities a handler requires of the principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorities(BTreeSet<String>);

impl Authorities {
    pub fn insert(&mut self, authority: impl Into<String>) {
        self.0.insert(authority.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Required authorities that `granted` does not cover.
    pub fn missing_from(&self, granted: &BTreeSet<String>) -> Vec<String> {
        self.0.difference(granted).cloned().collect()
    }
}

impl<S: Into<String>> Extend<S> for Authorities {
    fn extend<T: IntoIterator<Item = S>>(&mut self, iter: T) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// What a handler decided about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Proceed(Principal),
    Redirect(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication required: {reason}")]
    Unauthenticated {
        reason: String,
        challenge: Option<String>,
    },
    #[error("missing required authorities: {missing:?}")]
    Forbidden { missing: Vec<String> },
    #[error("oauth2 state does not match the issued state")]
    StateMismatch,
    #[error("authorization provider returned an error: {error}")]
    ProviderDenied { error: String },
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("auth handler misconfigured: {0}")]
    Configuration(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AuthError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
            challenge: None,
        }
    }

    pub fn challenge(reason: impl Into<String>, challenge: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
            challenge: Some(challenge.into()),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated { .. } | Self::ProviderDenied { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } | Self::StateMismatch => StatusCode::FORBIDDEN,
            Self::Exchange(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// The parts of a request a handler may look at.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub session: Option<&'a Session>,
}

impl<'a> AuthRequest<'a> {
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Credentials of an `Authorization: <scheme> <credentials>` header.
    ///
    /// The scheme name is matched case-insensitively.
    pub fn authorization(&self, scheme: &str) -> Option<&'a str> {
        let value = self.header(axum::http::header::AUTHORIZATION.as_str())?;
        let (name, credentials) = value.trim_start().split_once(' ')?;
        name.eq_ignore_ascii_case(scheme)
            .then(|| credentials.trim())
            .filter(|c| !c.is_empty())
    }

    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    /// Path and query, as a same-origin redirect target.
    pub fn path_and_query(&self) -> &'a str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// The request's session; handlers that need one fail closed without it.
    pub fn session(&self) -> Result<&'a Session, AuthError> {
        self.session
            .ok_or_else(|| AuthError::configuration("session middleware is not installed"))
    }
}

#[async_trait]
pub trait AuthHandler: Send + Sync {
    fn scheme(&self) -> AuthScheme;

    fn authorities(&self) -> &Authorities;

    fn authorities_mut(&mut self) -> &mut Authorities;

    /// Add a required authority for this handler.
    fn add_authority(mut self, authority: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.authorities_mut().insert(authority);
        self
    }

    /// Add a set of required authorities for this handler.
    fn add_authorities<I, S>(mut self, authorities: I) -> Self
    where
        Self: Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorities_mut().extend(authorities);
        self
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError>;
}

/// Check that `principal` holds every authority in `required`.
pub fn authorize(required: &Authorities, principal: &Principal) -> Result<(), AuthError> {
    let missing = required.missing_from(&principal.authorities);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::Forbidden { missing })
    }
}
