use std::collections::BTreeSet;
use std::{error::Error as StdError, fmt};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::services::auth::handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, Principal,
};

// Errors returned by bearer-token verification + strict claim validation.
#[derive(Debug)]
pub enum JwtError {
    InvalidKey(jsonwebtoken::errors::Error),
    Jwt(jsonwebtoken::errors::Error),
    MissingOrInvalidAud,
    EmptyClaim(&'static str),
}

impl fmt::Display for JwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey(e) => write!(f, "invalid jwt verification key: {}", e),
            Self::Jwt(e) => write!(f, "jwt verification failed: {}", e),
            Self::MissingOrInvalidAud => write!(f, "missing or invalid 'aud' claim"),
            Self::EmptyClaim(name) => write!(f, "empty '{}' claim", name),
        }
    }
}

impl StdError for JwtError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidKey(e) | Self::Jwt(e) => Some(e),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Self::Jwt(e)
    }
}

fn aud_is_present_and_valid(aud: &serde_json::Value) -> bool {
    match aud {
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(arr) => arr.iter().any(|v| match v {
            serde_json::Value::String(s) => !s.trim().is_empty(),
            _ => false,
        }),
        // Missing claim ends up as Null due to #[serde(default)]
        _ => false,
    }
}

/// Bearer token claims.
///
/// NOTE:
/// - `aud` can be either string or array; jsonwebtoken validates it via `Validation::set_audience`.
/// - `scope` (space-separated) and `roles` both become authorities.
#[derive(Debug, Clone, Deserialize)]
pub struct BearerClaims {
    pub iss: String,
    #[serde(default)]
    pub aud: serde_json::Value,

    pub sub: String,
    pub exp: u64,

    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

impl BearerClaims {
    pub fn authorities(&self) -> BTreeSet<String> {
        let scopes = self
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string);
        let roles = self.roles.iter().flatten().cloned();

        scopes.chain(roles).collect()
    }
}

/// Key material for bearer verification.
pub enum JwtKey<'a> {
    /// Ed25519 public key, PEM encoded.
    Ed25519Pem(&'a str),
    /// Shared HMAC secret.
    Hs256Secret(&'a [u8]),
}

/// Bearer JWT authentication (EdDSA or HS256).
///
/// - Key material is intentionally not printable via Debug.
pub struct JwtAuthHandler {
    decoding_key: DecodingKey,
    validation: Validation,
    realm: String,
    authorities: Authorities,
}

impl fmt::Debug for JwtAuthHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthHandler")
            .field("validation", &self.validation)
            .field("authorities", &self.authorities)
            .finish_non_exhaustive()
    }
}

impl JwtAuthHandler {
    pub fn new(
        key: JwtKey<'_>,
        issuer: &str,
        audience: &str,
        leeway_seconds: u64,
        realm: impl Into<String>,
    ) -> Result<Self, JwtError> {
        let (decoding_key, algorithm) = match key {
            JwtKey::Ed25519Pem(pem) => (
                DecodingKey::from_ed_pem(pem.as_bytes()).map_err(JwtError::InvalidKey)?,
                Algorithm::EdDSA,
            ),
            JwtKey::Hs256Secret(secret) => (DecodingKey::from_secret(secret), Algorithm::HS256),
        };

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.leeway = leeway_seconds;

        Ok(Self {
            decoding_key,
            validation,
            realm: realm.into(),
            authorities: Authorities::default(),
        })
    }

    /// Verify + strict claim validation.
    ///
    /// `jsonwebtoken::Validation` already checks:
    /// - signature
    /// - `exp`
    /// - `iss` and `aud` (because we set them)
    ///
    /// This method additionally checks that required claims are not empty.
    pub fn verify_strict(&self, token: &str) -> Result<BearerClaims, JwtError> {
        let claims =
            jsonwebtoken::decode::<BearerClaims>(token, &self.decoding_key, &self.validation)?
                .claims;

        if claims.iss.trim().is_empty() {
            return Err(JwtError::EmptyClaim("iss"));
        }
        if claims.sub.trim().is_empty() {
            return Err(JwtError::EmptyClaim("sub"));
        }
        if claims.exp == 0 {
            return Err(JwtError::EmptyClaim("exp"));
        }
        if !aud_is_present_and_valid(&claims.aud) {
            return Err(JwtError::MissingOrInvalidAud);
        }

        Ok(claims)
    }

    fn challenge(&self, reason: &str, invalid_token: bool) -> AuthError {
        let mut header = format!("Bearer realm=\"{}\"", self.realm);
        if invalid_token {
            header.push_str(", error=\"invalid_token\"");
        }
        AuthError::challenge(reason, header)
    }
}

#[async_trait]
impl AuthHandler for JwtAuthHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::Jwt
    }

    fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    fn authorities_mut(&mut self) -> &mut Authorities {
        &mut self.authorities
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError> {
        let token = req
            .authorization("Bearer")
            .ok_or_else(|| self.challenge("missing bearer token", false))?;

        let claims = match self.verify_strict(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(error = %err, "bearer token verification failed");
                return Err(self.challenge("invalid bearer token", true));
            }
        };

        let authorities = claims.authorities();
        Ok(AuthOutcome::Proceed(Principal {
            subject: claims.sub,
            scheme: AuthScheme::Jwt,
            authorities,
        }))
    }
}
