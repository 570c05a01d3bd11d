use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::services::auth::handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, Principal,
};
use crate::services::auth::oauth2::flow::{CallbackParams, FlowEvent, FlowState};
use crate::services::auth::oauth2::provider::{AuthorizeRequest, OAuth2Provider, TokenSet};
use crate::services::auth::secret::{random_token, sha256_hex};
use crate::services::session::Session;

/// Session key of the pending authorization request.
pub const FLOW_KEY: &str = "oauth2.flow";
/// Session key of a completed login.
pub const LOGIN_KEY: &str = "oauth2.login";

/// What a completed login leaves in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Login {
    pub principal: Principal,
    pub tokens: TokenSet,
    /// Unix seconds; `None` when the provider gave no lifetime.
    pub expires_at: Option<i64>,
}

impl OAuth2Login {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// OAuth2 authorization-code login.
///
/// Required authorities double as the requested scopes.
pub struct OAuth2AuthHandler {
    provider: Arc<dyn OAuth2Provider>,
    callback_base: Url,
    callback_path: Option<String>,
    extra_params: IndexMap<String, String>,
    exchange_timeout: Duration,
    flow_ttl: Duration,
    authorities: Authorities,
}

impl std::fmt::Debug for OAuth2AuthHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2AuthHandler")
            .field("client_id", &self.provider.client_id())
            .field("callback_base", &self.callback_base.as_str())
            .field("callback_path", &self.callback_path)
            .field("exchange_timeout", &self.exchange_timeout)
            .field("flow_ttl", &self.flow_ttl)
            .field("authorities", &self.authorities)
            .finish_non_exhaustive()
    }
}

impl OAuth2AuthHandler {
    /// `callback_base` is the externally visible origin the provider redirects back to.
    pub fn new(provider: Arc<dyn OAuth2Provider>, callback_base: &str) -> Result<Self, AuthError> {
        let callback_base = Url::parse(callback_base).map_err(|e| {
            AuthError::configuration(format!("invalid oauth2 callback base url: {e}"))
        })?;

        Ok(Self {
            provider,
            callback_base,
            callback_path: None,
            extra_params: IndexMap::new(),
            exchange_timeout: Duration::from_secs(10),
            flow_ttl: Duration::from_secs(600),
            authorities: Authorities::default(),
        })
    }

    /// Extra query parameters for the authorization URL (e.g. `prompt`).
    pub fn extra_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extra_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Bind the path the provider redirects back to. May be called once.
    pub fn setup_callback(mut self, path: &str) -> Result<Self, AuthError> {
        if let Some(existing) = &self.callback_path {
            return Err(AuthError::configuration(format!(
                "oauth2 callback already bound to {existing}"
            )));
        }
        if !path.starts_with('/') {
            return Err(AuthError::configuration(format!(
                "oauth2 callback path must be absolute: {path}"
            )));
        }

        self.callback_path = Some(path.to_string());
        Ok(self)
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn with_flow_ttl(mut self, ttl: Duration) -> Self {
        self.flow_ttl = ttl;
        self
    }

    pub fn callback_path(&self) -> Option<&str> {
        self.callback_path.as_deref()
    }

    fn redirect_uri(&self, callback_path: &str) -> Result<String, AuthError> {
        self.callback_base
            .join(callback_path)
            .map(String::from)
            .map_err(|e| AuthError::configuration(format!("invalid oauth2 redirect uri: {e}")))
    }

    fn flow_ttl_seconds(&self) -> i64 {
        i64::try_from(self.flow_ttl.as_secs()).unwrap_or(i64::MAX)
    }

    async fn begin(
        &self,
        req: &AuthRequest<'_>,
        session: &Session,
        callback_path: &str,
        now: i64,
    ) -> Result<AuthOutcome, AuthError> {
        let ttl = self.flow_ttl_seconds();
        let state_token = random_token()?;

        let redirected = FlowState::Unauthenticated
            .on(
                FlowEvent::Begin {
                    state: state_token,
                    return_to: req.path_and_query().to_string(),
                    now,
                },
                ttl,
            )
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let FlowState::RedirectedToProvider { state, .. } = &redirected else {
            return Err(AuthError::configuration("oauth2 flow did not start"));
        };

        let redirect_uri = self.redirect_uri(callback_path)?;
        let url = self
            .provider
            .authorize_url(&AuthorizeRequest {
                redirect_uri: &redirect_uri,
                scopes: self.authorities.iter().collect(),
                state: state.as_str(),
                extra_params: &self.extra_params,
            })
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let awaiting = redirected
            .on(FlowEvent::RedirectIssued, ttl)
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        session.put_json(FLOW_KEY, &awaiting).await?;

        tracing::debug!(path = %req.path(), "oauth2 flow started; redirecting to provider");
        Ok(AuthOutcome::Redirect(url.into()))
    }

    async fn complete(
        &self,
        req: &AuthRequest<'_>,
        session: &Session,
        callback_path: &str,
        now: i64,
    ) -> Result<AuthOutcome, AuthError> {
        let ttl = self.flow_ttl_seconds();
        let pending = session
            .get_json::<FlowState>(FLOW_KEY)
            .await?
            .unwrap_or(FlowState::Unauthenticated);

        // The state token is single use whatever the outcome.
        session.remove(FLOW_KEY).await?;

        let params = CallbackParams::from_query(req.uri.query());
        let next = pending
            .on(FlowEvent::Callback { params, now }, ttl)
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        let code = match &next {
            FlowState::ExchangingCode { code, .. } => code.clone(),
            FlowState::Failed { reason } => {
                let err = reason.clone().into_error();
                match &err {
                    AuthError::StateMismatch => tracing::warn!(
                        path = %req.path(),
                        "oauth2 callback state mismatch; possible csrf attempt"
                    ),
                    other => tracing::info!(error = %other, "oauth2 callback rejected"),
                }
                return Err(err);
            }
            other => {
                return Err(AuthError::configuration(format!(
                    "unexpected oauth2 flow state {}",
                    other.name()
                )));
            }
        };

        let exchanging = next;
        let redirect_uri = self.redirect_uri(callback_path)?;
        let exchanged =
            tokio::time::timeout(self.exchange_timeout, self.provider.get_token(&code, &redirect_uri))
                .await;

        let (event, tokens) = match exchanged {
            Ok(Ok(tokens)) => (FlowEvent::ExchangeSucceeded, Some(tokens)),
            Ok(Err(e)) => (
                FlowEvent::ExchangeFailed {
                    message: e.to_string(),
                },
                None,
            ),
            Err(_) => (
                FlowEvent::ExchangeFailed {
                    message: format!("no response within {:?}", self.exchange_timeout),
                },
                None,
            ),
        };

        let done = exchanging
            .on(event, ttl)
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        match (done, tokens) {
            (FlowState::Authenticated { return_to }, Some(tokens)) => {
                let login = self.login_from(tokens, now);
                session.regenerate().await?;
                session.put_json(LOGIN_KEY, &login).await?;
                tracing::info!(subject = %login.principal.subject, "oauth2 login completed");
                Ok(AuthOutcome::Redirect(return_to))
            }
            (FlowState::Failed { reason }, _) => {
                let err = reason.into_error();
                tracing::warn!(error = %err, "oauth2 token exchange failed");
                Err(err)
            }
            (other, _) => Err(AuthError::configuration(format!(
                "unexpected oauth2 flow state {}",
                other.name()
            ))),
        }
    }

    fn login_from(&self, tokens: TokenSet, now: i64) -> OAuth2Login {
        // RFC 6749 §5.1: an omitted scope means the requested one was granted.
        let authorities: Vec<String> = match tokens.scope.as_deref() {
            Some(granted) => granted.split_whitespace().map(str::to_string).collect(),
            None => self.authorities.iter().map(str::to_string).collect(),
        };

        let subject = tokens
            .id_token
            .as_deref()
            .and_then(id_token_subject)
            .unwrap_or_else(|| format!("oauth2:{}", &sha256_hex(&tokens.access_token)[..16]));

        let expires_at = tokens
            .expires_in
            .and_then(|s| i64::try_from(s).ok())
            .map(|s| now.saturating_add(s));

        OAuth2Login {
            principal: Principal::new(subject, AuthScheme::OAuth2, authorities),
            tokens,
            expires_at,
        }
    }
}

/// `sub` of an ID token received directly from the token endpoint.
///
/// The token came over the provider's TLS channel, so its signature is not
/// re-verified here (OIDC Core §3.1.3.7).
fn id_token_subject(id_token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Claims {
        sub: String,
    }

    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    (!claims.sub.is_empty()).then_some(claims.sub)
}

#[async_trait]
impl AuthHandler for OAuth2AuthHandler {
    fn scheme(&self) -> AuthScheme {
        AuthScheme::OAuth2
    }

    fn authorities(&self) -> &Authorities {
        &self.authorities
    }

    fn authorities_mut(&mut self) -> &mut Authorities {
        &mut self.authorities
    }

    async fn handle(&self, req: &AuthRequest<'_>) -> Result<AuthOutcome, AuthError> {
        let callback_path = self
            .callback_path
            .as_deref()
            .ok_or_else(|| AuthError::configuration("oauth2 callback was never set up"))?;
        let session = req.session()?;
        let now = chrono::Utc::now().timestamp();

        if req.path() == callback_path {
            return self.complete(req, session, callback_path, now).await;
        }

        if let Some(login) = session.get_json::<OAuth2Login>(LOGIN_KEY).await? {
            if !login.is_expired(now) {
                return Ok(AuthOutcome::Proceed(login.principal));
            }
            tracing::debug!(subject = %login.principal.subject, "oauth2 token expired; restarting flow");
            session.remove(LOGIN_KEY).await?;
        }

        self.begin(req, session, callback_path, now).await
    }
}
