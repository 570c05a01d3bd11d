use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint rejected the grant ({status}): {error}")]
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },
    #[error("malformed token response: {0}")]
    Malformed(String),
}

/// Everything needed to build the provider's authorization URL.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest<'a> {
    pub redirect_uri: &'a str,
    pub scopes: Vec<&'a str>,
    pub state: &'a str,
    pub extra_params: &'a IndexMap<String, String>,
}

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Error body of the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// An OAuth2 authorization server, as the code flow sees it.
#[async_trait]
pub trait OAuth2Provider: Send + Sync {
    fn client_id(&self) -> &str;

    fn authorize_url(&self, req: &AuthorizeRequest<'_>) -> Result<Url, ProviderError>;

    /// Exchange an authorization code for tokens.
    async fn get_token(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, ProviderError>;
}

/// Provider reached over HTTP(S) with a confidential or public client.
///
/// The client secret, when present, is sent with HTTP Basic
/// (`client_secret_basic`).
#[derive(Clone)]
pub struct HttpOAuth2Provider {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<String>,
    authorize_endpoint: Url,
    token_endpoint: Url,
}

impl std::fmt::Debug for HttpOAuth2Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the client secret
        f.debug_struct("HttpOAuth2Provider")
            .field("client_id", &self.client_id)
            .field("authorize_endpoint", &self.authorize_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpOAuth2Provider {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        authorize_endpoint: &str,
        token_endpoint: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret,
            authorize_endpoint: Url::parse(authorize_endpoint)?,
            token_endpoint: Url::parse(token_endpoint)?,
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl OAuth2Provider for HttpOAuth2Provider {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn authorize_url(&self, req: &AuthorizeRequest<'_>) -> Result<Url, ProviderError> {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", req.redirect_uri)
                .append_pair("state", req.state);
            if !req.scopes.is_empty() {
                query.append_pair("scope", &req.scopes.join(" "));
            }
            for (key, value) in req.extra_params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_token(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, ProviderError> {
        let mut request = self.http.post(self.token_endpoint.clone()).form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
        ]);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret));
        }

        let resp = request.header("accept", "application/json").send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let parsed: Option<TokenErrorBody> = serde_json::from_str(&body).ok();
            return Err(match parsed {
                Some(err) => ProviderError::Rejected {
                    status: status.as_u16(),
                    error: err.error,
                    description: err.error_description,
                },
                None => ProviderError::Rejected {
                    status: status.as_u16(),
                    error: "unexpected_response".to_string(),
                    description: None,
                },
            });
        }

        let tokens: TokenSet =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(ProviderError::Malformed("empty access_token".to_string()));
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_url_carries_flow_parameters() {
        let provider = HttpOAuth2Provider::new(
            "client-1",
            None,
            "https://idp.example/authorize?tenant=t1",
            "https://idp.example/token",
        )
        .unwrap();
        let mut extra = IndexMap::new();
        extra.insert("prompt".to_string(), "consent".to_string());

        let url = provider
            .authorize_url(&AuthorizeRequest {
                redirect_uri: "https://app.example/oauth2/callback",
                scopes: vec!["openid", "profile"],
                state: "st-1",
                extra_params: &extra,
            })
            .unwrap();

        let pairs: IndexMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["tenant"], "t1");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["redirect_uri"], "https://app.example/oauth2/callback");
        assert_eq!(pairs["scope"], "openid profile");
        assert_eq!(pairs["state"], "st-1");
        assert_eq!(pairs["prompt"], "consent");
    }

    #[test]
    fn invalid_endpoint_is_reported() {
        assert!(matches!(
            HttpOAuth2Provider::new("c", None, "not a url", "https://idp.example/token"),
            Err(ProviderError::InvalidEndpoint(_))
        ));
    }
}
