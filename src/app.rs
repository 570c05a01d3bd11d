/*
 * Responsibility
 * - Config読み込み → 依存生成 (session store, credential store, auth handlers) → Router 組み立て
 * - Middleware の適用 (session / security headers / CORS / HTTP)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::api::v1::handlers::health::health;
use crate::config::{Config, JwtKeyConfig};
use crate::error::AppError;
use crate::middleware;
use crate::middleware::http::HttpLimits;
use crate::middleware::session::SessionLayerConfig;
use crate::services::auth::{
    AuthHandler, BasicAuthHandler, ChainAuthHandler, CredentialStore, DigestAuthHandler,
    HttpOAuth2Provider, JwtAuthHandler, JwtKey, OAuth2AuthHandler, RedirectAuthHandler,
};
use crate::services::session::{MemorySessionStore, SessionStore, ValkeySessionStore};
use crate::state::AppState;

/// The OAuth2 handler and the path its callback is bound to.
pub struct OAuth2Mount {
    pub handler: Arc<dyn AuthHandler>,
    pub callback_path: String,
}

/// Every configured auth handler, frozen for serving.
pub struct AuthHandlers {
    pub basic: Arc<dyn AuthHandler>,
    pub digest: Arc<dyn AuthHandler>,
    pub jwt: Option<Arc<dyn AuthHandler>>,
    pub portal: Arc<dyn AuthHandler>,
    pub any: Arc<dyn AuthHandler>,
    pub oauth2: Option<OAuth2Mount>,
}

pub fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,routegate=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing (stderr can be hidden).
        tracing::error!(?info, "panic");

        // Development: fail fast. Production: default behavior, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting routegate in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let sessions = build_session_store(&config).await?;
    let app = build_app(&config, sessions)?;

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

pub async fn build_session_store(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match &config.session.valkey_url {
        Some(url) => Arc::new(
            ValkeySessionStore::new(url)
                .await
                .context("failed to connect to the valkey session backend")?,
        ),
        None => {
            if config.app_env.is_production() {
                tracing::warn!("VALKEY_URL not set; sessions are process-local");
            }
            Arc::new(MemorySessionStore::new())
        }
    };

    tracing::info!(backend = store.backend_name(), "session store ready");
    Ok(store)
}

pub fn build_auth_handlers(
    config: &Config,
    credentials: Arc<dyn CredentialStore>,
) -> Result<AuthHandlers, AppError> {
    if config.users.is_empty() {
        tracing::warn!("AUTH_USERS is empty; basic, digest and form login will reject everyone");
    }

    let basic: Arc<dyn AuthHandler> = Arc::new(BasicAuthHandler::new(
        credentials.clone(),
        config.auth_realm.clone(),
    ));

    let digest: Arc<dyn AuthHandler> = Arc::new(
        DigestAuthHandler::new(
            credentials,
            config.auth_realm.clone(),
            config.digest_secret.expose(),
        )
        .with_nonce_ttl(Duration::from_secs(config.digest_nonce_ttl_seconds)),
    );

    let jwt: Option<Arc<dyn AuthHandler>> = match &config.jwt {
        Some(jwt) => {
            let key = match &jwt.key {
                JwtKeyConfig::Ed25519PublicPem(pem) => JwtKey::Ed25519Pem(pem),
                JwtKeyConfig::Hs256Secret(secret) => JwtKey::Hs256Secret(secret.expose().as_bytes()),
            };
            let handler = JwtAuthHandler::new(
                key,
                &jwt.issuer,
                &jwt.audience,
                jwt.leeway_seconds,
                config.auth_realm.clone(),
            )
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build jwt handler");
                AppError::Internal
            })?;
            Some(Arc::new(handler))
        }
        None => None,
    };

    let portal: Arc<dyn AuthHandler> = Arc::new(RedirectAuthHandler::new(config.login_path.clone()));

    let mut chain = ChainAuthHandler::new().append(basic.clone());
    if let Some(jwt) = &jwt {
        chain = chain.append(jwt.clone());
    }
    let any: Arc<dyn AuthHandler> = Arc::new(chain.append(digest.clone()));

    let oauth2 = match &config.oauth2 {
        Some(oauth2) => {
            let provider = HttpOAuth2Provider::new(
                oauth2.client_id.clone(),
                oauth2
                    .client_secret
                    .as_ref()
                    .map(|s| s.expose().to_string()),
                &oauth2.authorize_url,
                &oauth2.token_url,
            )
            .map_err(|e| {
                tracing::error!(error = %e, "invalid oauth2 provider endpoints");
                AppError::Internal
            })?;

            let handler = OAuth2AuthHandler::new(Arc::new(provider), &config.public_base_url)?
                .add_authorities(oauth2.scopes.iter().cloned())
                .with_exchange_timeout(Duration::from_secs(oauth2.exchange_timeout_seconds))
                .with_flow_ttl(Duration::from_secs(oauth2.flow_ttl_seconds))
                .setup_callback(&oauth2.callback_path)?;

            Some(OAuth2Mount {
                handler: Arc::new(handler),
                callback_path: oauth2.callback_path.clone(),
            })
        }
        None => None,
    };

    Ok(AuthHandlers {
        basic,
        digest,
        jwt,
        portal,
        any,
        oauth2,
    })
}

/// Build the complete application (routes + middleware) around `sessions`.
pub fn build_app(config: &Config, sessions: Arc<dyn SessionStore>) -> Result<Router, AppError> {
    let credentials: Arc<dyn CredentialStore> = Arc::new(config.users.clone());
    let handlers = build_auth_handlers(config, credentials.clone())?;
    let state = AppState::new(
        credentials,
        config.auth_realm.clone(),
        config.login_path.clone(),
    );

    let mut router = Router::new()
        .route("/health", get(health))
        .merge(api::login::routes(&config.login_path))
        .nest("/api/v1", api::v1::routes(&handlers));

    if let Some(oauth2) = &handlers.oauth2 {
        let callback = Router::new().route(
            &oauth2.callback_path,
            get(api::login::oauth2_callback_landing),
        );
        router = router.merge(middleware::auth::guard::apply(
            callback,
            oauth2.handler.clone(),
        ));
    }

    let router = middleware::session::apply(
        router,
        SessionLayerConfig {
            store: sessions,
            cookie_name: config.session.cookie_name.clone(),
            ttl: Duration::from_secs(config.session.ttl_seconds),
            secure: config.app_env.is_production(),
        },
    )
    .with_state(state);

    // The global timeout must outlast the token exchange.
    let exchange_timeout = config
        .oauth2
        .as_ref()
        .map(|o| Duration::from_secs(o.exchange_timeout_seconds))
        .unwrap_or_default();
    let limits = HttpLimits {
        timeout: HttpLimits::default()
            .timeout
            .max(exchange_timeout + Duration::from_secs(5)),
        ..HttpLimits::default()
    };

    let router = middleware::security_headers::apply(router);
    let router = middleware::cors::apply(router, config);
    Ok(middleware::http::apply(router, limits))
}
