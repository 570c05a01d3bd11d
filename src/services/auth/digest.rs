//! HTTP Digest authentication (RFC 7616), SHA-256 with `qop=auth`.
//!
//! Nonces are stateless: `base64url(timestamp ":" sha256(timestamp ":" secret))`.
//! A nonce with a valid signature but past its TTL is answered with
//! `stale=true` so the client can retry without prompting the user.
//! Nonce-count replay tracking is not done.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::services::auth::credentials::CredentialStore;
use crate::services::auth::handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, Principal,
};
use crate::services::auth::secret::{constant_time_eq, sha256_hex};
use crate::services::negotiation::{split_top_level, unquote};

const ALGORITHM: &str = "SHA-256";
const QOP: &str = "auth";

pub struct DigestAuthHandler {
    credentials: Arc<dyn CredentialStore>,
    realm: String,
    secret: String,
    opaque: String,
    nonce_ttl: Duration,
    authorities: Authorities,
}

impl std::fmt::Debug for DigestAuthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the nonce secret
        f.debug_struct("DigestAuthHandler")
            .field("realm", &self.realm)
            .field("nonce_ttl", &self.nonce_ttl)
            .field("authorities", &self.authorities)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonceCheck {
    Fresh,
    Stale,
    Invalid,
}

#[derive(Debug, Default)]
struct DigestCredentials {
    params: HashMap<String, String>,
}

impl DigestCredentials {
    fn parse(raw: &str) -> Result<Self, &'static str> {
        let parts = split_top_level(raw, b',').map_err(|_| "unterminated quote in digest credentials")?;

        let mut params = HashMap::new();
        for part in parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or("digest credentials must be key=value pairs")?;
            params.insert(key.trim().to_ascii_lowercase(), unquote(value.trim()));
        }

        Ok(Self { params })
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    fn require(&self, key: &'static str) -> Result<&str, String> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("digest credentials missing '{key}'"))
    }
}

impl DigestAuthHandler {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        realm: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let realm = realm.into();
        let opaque = sha256_hex(&format!("opaque:{realm}"))[..32].to_string();

        Self {
            credentials,
            realm,
            secret: secret.into(),
            opaque,
            nonce_ttl: Duration::from_secs(300),
            authorities: Authorities::default(),
        }
    }

    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = ttl;
        self
    }

    fn issue_nonce(&self, issued_at: i64) -> String {
        let sig = sha256_hex(&format!("{issued_at}:{}", self.secret));
        URL_SAFE_NO_PAD.encode(format!("{issued_at}:{sig}"))
    }

    fn check_nonce(&self, nonce: &str, now: i64) -> NonceCheck {
        let Some(decoded) = URL_SAFE_NO_PAD
            .decode(nonce)
            .ok()
            .and_then(|b| String::from_utf8(b).ok())
        else {
            return NonceCheck::Invalid;
        };
        let Some((ts, sig)) = decoded.split_once(':') else {
            return NonceCheck::Invalid;
        };
        let Ok(issued_at) = ts.parse::<i64>() else {
            return NonceCheck::Invalid;
        };

        let expected = sha256_hex(&format!("{issued_at}:{}", self.secret));
        if !constant_time_eq(&expected, sig) {
            return NonceCheck::Invalid;
        }

        let ttl = i64::try_from(self.nonce_ttl.as_secs()).unwrap_or(i64::MAX);
        if issued_at > now || now - issued_at > ttl {
            NonceCheck::Stale
        } else {
            NonceCheck::Fresh
        }
    }

    fn challenge(&self, reason: impl Into<String>, stale: bool, now: i64) -> AuthError {
        let mut header = format!(
            "Digest realm=\"{}\", qop=\"{QOP}\", algorithm={ALGORITHM}, nonce=\"{}\", opaque=\"{}\"",
            self.realm,
            self.issue_nonce(now),
            self.opaque,
        );
        if stale {
            header.push_str(", stale=true");
        }
        AuthError::challenge(reason, header)
    }

    async fn verify(
        &self,
        req: &AuthRequest<'_>,
        creds: &DigestCredentials,
        now: i64,
    ) -> Result<Principal, AuthError> {
        let reject = |reason: String| self.challenge(reason, false, now);

        let username = creds.require("username").map_err(reject)?;
        let realm = creds.require("realm").map_err(reject)?;
        let nonce = creds.require("nonce").map_err(reject)?;
        let uri = creds.require("uri").map_err(reject)?;
        let response = creds.require("response").map_err(reject)?;
        let nc = creds.require("nc").map_err(reject)?;
        let cnonce = creds.require("cnonce").map_err(reject)?;
        let qop = creds.require("qop").map_err(reject)?;

        if realm != self.realm {
            return Err(reject("digest realm mismatch".into()));
        }
        // Absent algorithm means MD5, which is not offered.
        if !creds
            .get("algorithm")
            .is_some_and(|a| a.eq_ignore_ascii_case(ALGORITHM))
        {
            return Err(reject("unsupported digest algorithm".into()));
        }
        if !qop.eq_ignore_ascii_case(QOP) {
            return Err(reject("unsupported digest qop".into()));
        }
        if creds.get("userhash").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Err(reject("digest userhash is not supported".into()));
        }
        if creds.get("opaque").is_some_and(|o| o != self.opaque) {
            return Err(reject("digest opaque mismatch".into()));
        }
        if uri != req.path_and_query() {
            return Err(reject("digest uri does not match the request".into()));
        }

        let nonce_state = self.check_nonce(nonce, now);
        if nonce_state == NonceCheck::Invalid {
            tracing::warn!(username = %username, "digest nonce signature invalid");
            return Err(reject("invalid digest nonce".into()));
        }

        let Some(user) = self.credentials.lookup(username).await else {
            tracing::info!(username = %username, "digest authentication failed");
            return Err(reject("invalid username or password".into()));
        };

        let ha1 = user.digest_ha1(&self.realm);
        let ha2 = sha256_hex(&format!("{}:{uri}", req.method.as_str()));
        let expected = sha256_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:{QOP}:{ha2}"));

        if !constant_time_eq(&expected, &response.to_ascii_lowercase()) {
            tracing::info!(username = %username, "digest authentication failed");
            return Err(reject("invalid username or password".into()));
        }

        if nonce_state == NonceCheck::Stale {
            return Err(self.challenge("digest nonce is stale", true, now));
        }

        Ok(Principal::new(user.username, AuthScheme::Digest, user.authorities))
    }
}

#[async_trait]
impl AuthHandler for DigestAuthHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Digest
    }

    fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    fn authorities_mut(&mut self) -> &mut Authorities {
        &mut self.authorities
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError> {
        let now = chrono::Utc::now().timestamp();

        let raw = req
            .authorization("Digest")
            .ok_or_else(|| self.challenge("missing digest credentials", false, now))?;

        let creds = DigestCredentials::parse(raw)
            .map_err(|reason| self.challenge(reason, false, now))?;

        let principal = self.verify(req, &creds, now).await?;
        tracing::debug!(username = %principal.subject, "authenticated via digest");

        Ok(AuthOutcome::Proceed(principal))
    }
}

/// Build an `Authorization: Digest` value the way a client would.
#[cfg(test)]
pub(crate) fn client_authorization(
    username: &str,
    password: &str,
    realm: &str,
    method: &str,
    uri: &str,
    nonce: &str,
    opaque: &str,
) -> String {
    let ha1 = sha256_hex(&format!("{username}:{realm}:{password}"));
    let ha2 = sha256_hex(&format!("{method}:{uri}"));
    let nc = "00000001";
    let cnonce = "0a4f113b";
    let response = sha256_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"));

    format!(
        "Digest username=\"{username}\", realm=\"{realm}\", uri=\"{uri}\", algorithm=SHA-256, \
         nonce=\"{nonce}\", nc={nc}, cnonce=\"{cnonce}\", qop=auth, response=\"{response}\", \
         opaque=\"{opaque}\""
    )
}
