/*
 * Responsibility
 * - 環境変数の読み込み (PORT, CORS, session, auth handlers, OAuth2 provider)
 * - 設定値のバリデーション (不足・不正なら起動失敗)
 * - JWT / OAuth2 は任意: 設定されている場合のみ該当ルートを有効化
 */
use std::net::SocketAddr;
use std::str::FromStr;
use std::{env, fmt};

use crate::services::auth::MemoryCredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: Option<&str>) -> Self {
        match raw
            .unwrap_or("development")
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A configuration value that must not end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl_seconds: u64,
    // Valkey (Redis protocol) backend; in-memory when unset
    pub valkey_url: Option<String>,
}

#[derive(Clone, Debug)]
pub enum JwtKeyConfig {
    Ed25519PublicPem(String),
    Hs256Secret(Secret),
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub key: JwtKeyConfig,
    pub leeway_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<Secret>,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub callback_path: String,
    pub exchange_timeout_seconds: u64,
    pub flow_ttl_seconds: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,
    // Externally visible origin (OAuth2 redirect_uri base)
    pub public_base_url: String,

    pub session: SessionConfig,

    pub auth_realm: String,
    pub users: MemoryCredentialStore,
    pub digest_secret: Secret,
    pub digest_nonce_ttl_seconds: u64,
    pub login_path: String,

    pub jwt: Option<JwtConfig>,
    pub oauth2: Option<OAuth2Config>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = parse_or(get("PORT"), "PORT", 3000)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(get("APP_ENV").as_deref());

        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let public_base_url =
            get("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://localhost:{}", port));
        url::Url::parse(&public_base_url).map_err(|_| ConfigError::Invalid("PUBLIC_BASE_URL"))?;

        let session = SessionConfig {
            cookie_name: get("SESSION_COOKIE_NAME").unwrap_or_else(|| "sid".to_string()),
            ttl_seconds: parse_or(get("SESSION_TTL_SECONDS"), "SESSION_TTL_SECONDS", 3600)?,
            valkey_url: get("VALKEY_URL"),
        };

        let auth_realm = get("AUTH_REALM").unwrap_or_else(|| "routegate".to_string());

        let users = MemoryCredentialStore::parse(&get("AUTH_USERS").unwrap_or_default())
            .map_err(|_| ConfigError::Invalid("AUTH_USERS"))?;

        // Production must pin the secret so nonces survive restarts and replicas.
        let digest_secret = match get("DIGEST_SECRET") {
            Some(secret) => Secret::new(secret),
            None if app_env.is_production() => return Err(ConfigError::Missing("DIGEST_SECRET")),
            None => Secret::new(
                crate::services::auth::secret::random_token()
                    .map_err(|_| ConfigError::Invalid("DIGEST_SECRET"))?,
            ),
        };
        let digest_nonce_ttl_seconds =
            parse_or(get("DIGEST_NONCE_TTL_SECONDS"), "DIGEST_NONCE_TTL_SECONDS", 300)?;

        let login_path = get("LOGIN_PATH").unwrap_or_else(|| "/login".to_string());
        if !login_path.starts_with('/') {
            return Err(ConfigError::Invalid("LOGIN_PATH"));
        }

        let jwt = jwt_config(&get)?;
        let oauth2 = oauth2_config(&get)?;

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            public_base_url,
            session,
            auth_realm,
            users,
            digest_secret,
            digest_nonce_ttl_seconds,
            login_path,
            jwt,
            oauth2,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn jwt_config(get: &impl Fn(&str) -> Option<String>) -> Result<Option<JwtConfig>, ConfigError> {
    let key = match (get("ACCESS_JWT_PUBLIC_KEY_PEM"), get("ACCESS_JWT_HS256_SECRET")) {
        (Some(pem), None) => JwtKeyConfig::Ed25519PublicPem(pem.replace("\\n", "\n")),
        (None, Some(secret)) => JwtKeyConfig::Hs256Secret(Secret::new(secret)),
        (Some(_), Some(_)) => return Err(ConfigError::Invalid("ACCESS_JWT_HS256_SECRET")),
        (None, None) => return Ok(None),
    };

    Ok(Some(JwtConfig {
        issuer: get("AUTH_ISSUER").ok_or(ConfigError::Missing("AUTH_ISSUER"))?,
        audience: get("AUTH_AUDIENCE").ok_or(ConfigError::Missing("AUTH_AUDIENCE"))?,
        key,
        leeway_seconds: parse_or(
            get("ACCESS_TOKEN_LEEWAY_SECONDS"),
            "ACCESS_TOKEN_LEEWAY_SECONDS",
            60,
        )?,
    }))
}

fn oauth2_config(
    get: &impl Fn(&str) -> Option<String>,
) -> Result<Option<OAuth2Config>, ConfigError> {
    let Some(client_id) = get("OAUTH2_CLIENT_ID") else {
        return Ok(None);
    };

    let callback_path =
        get("OAUTH2_CALLBACK_PATH").unwrap_or_else(|| "/oauth2/callback".to_string());
    if !callback_path.starts_with('/') {
        return Err(ConfigError::Invalid("OAUTH2_CALLBACK_PATH"));
    }

    Ok(Some(OAuth2Config {
        client_id,
        client_secret: get("OAUTH2_CLIENT_SECRET").map(Secret::new),
        authorize_url: get("OAUTH2_AUTHORIZE_URL")
            .ok_or(ConfigError::Missing("OAUTH2_AUTHORIZE_URL"))?,
        token_url: get("OAUTH2_TOKEN_URL").ok_or(ConfigError::Missing("OAUTH2_TOKEN_URL"))?,
        scopes: get("OAUTH2_SCOPES")
            .unwrap_or_default()
            .split([' ', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        callback_path,
        exchange_timeout_seconds: parse_or(
            get("OAUTH2_EXCHANGE_TIMEOUT_SECONDS"),
            "OAUTH2_EXCHANGE_TIMEOUT_SECONDS",
            10,
        )?,
        flow_ttl_seconds: parse_or(get("OAUTH2_FLOW_TTL_SECONDS"), "OAUTH2_FLOW_TTL_SECONDS", 600)?,
    }))
}
