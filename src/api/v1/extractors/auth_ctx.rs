/*
 * Responsibility
 * - Handler から見える「認証済みコンテキスト」(AuthCtx)
 * - guard middleware が AuthHandler の Principal から作り、request extensions に格納する
 * - AuthCtxExtractor で handler に渡す。guard の無いルートでは 401 (JSON envelope)
 *
 * Notes
 * - どの方式で認証されたかは `scheme` で区別する
 * - required authorities のチェックは guard 側で済んでいる
 */
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

use crate::error::AppError;
use crate::services::auth::{AuthScheme, Principal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthCtx {
    pub subject: String,
    pub scheme: AuthScheme,
    pub authorities: Vec<String>,
}

impl AuthCtx {
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.iter().any(|a| a == authority)
    }
}

impl From<Principal> for AuthCtx {
    fn from(p: Principal) -> Self {
        Self {
            subject: p.subject,
            scheme: p.scheme,
            // BTreeSet order: sorted, deduplicated
            authorities: p.authorities.into_iter().collect(),
        }
    }
}

pub struct AuthCtxExtractor(pub AuthCtx);

impl<S> FromRequestParts<S> for AuthCtxExtractor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthCtx>() {
            Some(ctx) => Ok(Self(ctx.clone())),
            None => {
                tracing::error!(path = %parts.uri.path(), "AuthCtx requested on a route without an auth guard");
                Err(AppError::Unauthorized { challenge: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    #[test]
    fn built_from_principal() {
        let p = Principal::new("alice", AuthScheme::Basic, ["write", "read", "read"]);
        let ctx = AuthCtx::from(p);

        assert_eq!(ctx.subject, "alice");
        assert_eq!(ctx.authorities, ["read", "write"]);
        assert!(ctx.has_authority("write"));
        assert!(!ctx.has_authority("admin"));
    }

    #[tokio::test]
    async fn missing_context_is_unauthorized() {
        let (mut parts, _) = Request::new(()).into_parts();
        let rejected = AuthCtxExtractor::from_request_parts(&mut parts, &()).await;
        assert!(matches!(rejected, Err(AppError::Unauthorized { challenge: None })));

        let ctx = AuthCtx::from(Principal::new("bob", AuthScheme::Digest, Vec::<String>::new()));
        parts.extensions.insert(ctx.clone());
        let AuthCtxExtractor(found) = AuthCtxExtractor::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(found, ctx);
    }
}
