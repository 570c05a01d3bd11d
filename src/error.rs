/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (HTTP status / JSON error body / WWW-Authenticate)
 * - AuthError / NegotiationError / ConfigError を統一的に変換
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::auth::AuthError;
use crate::services::negotiation::NegotiationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized")]
    Unauthorized { challenge: Option<String> },

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("no acceptable representation")]
    NotAcceptable,

    #[error("upstream authorization server failed")]
    BadGateway,

    #[error("internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            AppError::BadGateway => StatusCode::BAD_GATEWAY,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized { .. } => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound => "NOT_FOUND",
            AppError::NotAcceptable => "NOT_ACCEPTABLE",
            AppError::BadGateway => "BAD_GATEWAY",
            AppError::Internal => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenge = match &self {
            AppError::Unauthorized { challenge } => challenge
                .as_deref()
                .and_then(|c| HeaderValue::from_str(c).ok()),
            _ => None,
        };

        let body = ErrorResponseBody {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(value) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthenticated { reason, challenge } => {
                tracing::debug!(reason = %reason, "request not authenticated");
                AppError::Unauthorized { challenge }
            }
            AuthError::ProviderDenied { error } => {
                tracing::info!(error = %error, "authorization provider denied the request");
                AppError::Unauthorized { challenge: None }
            }
            AuthError::Forbidden { missing } => {
                tracing::info!(?missing, "principal lacks required authorities");
                AppError::Forbidden
            }
            AuthError::StateMismatch => AppError::Forbidden,
            AuthError::Exchange(message) => {
                tracing::warn!(error = %message, "oauth2 token exchange failed");
                AppError::BadGateway
            }
            AuthError::Configuration(message) => {
                tracing::error!(error = %message, "auth handler misconfigured");
                AppError::Internal
            }
            AuthError::Session(e) => {
                tracing::error!(error = %e, "session backend failure");
                AppError::Internal
            }
        }
    }
}

impl From<NegotiationError> for AppError {
    fn from(_: NegotiationError) -> Self {
        AppError::NotAcceptable
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        tracing::error!(error = %e, "configuration error");
        AppError::Internal
    }
}
