//! The authorization-code flow as a pure state machine.
//!
//! ```text
//! Unauthenticated --Begin--> RedirectedToProvider --RedirectIssued--> AwaitingCallback
//! AwaitingCallback --Callback--> ExchangingCode | Failed
//! ExchangingCode --ExchangeSucceeded--> Authenticated
//! ExchangingCode --ExchangeFailed--> Failed
//! ```
//!
//! Only `AwaitingCallback` is persisted between requests; `ExchangingCode`
//! holds the authorization code and lives for a single request.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::auth::handler::AuthError;
use crate::services::auth::secret::constant_time_eq;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum FlowState {
    Unauthenticated,
    RedirectedToProvider {
        state: String,
        return_to: String,
        issued_at: i64,
    },
    AwaitingCallback {
        state: String,
        return_to: String,
        issued_at: i64,
    },
    #[serde(skip)]
    ExchangingCode { code: String, return_to: String },
    Authenticated { return_to: String },
    Failed { reason: FailureReason },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    ProviderDenied {
        error: String,
        description: Option<String>,
    },
    StateMismatch,
    Expired,
    MissingCode,
    Exchange { message: String },
}

impl FailureReason {
    pub fn into_error(self) -> AuthError {
        match self {
            Self::ProviderDenied { error, description } => AuthError::ProviderDenied {
                error: match description {
                    Some(d) => format!("{error}: {d}"),
                    None => error,
                },
            },
            Self::StateMismatch => AuthError::StateMismatch,
            Self::Expired => AuthError::unauthenticated("oauth2 login flow expired"),
            Self::MissingCode => AuthError::unauthenticated("callback carried no authorization code"),
            Self::Exchange { message } => AuthError::Exchange(message),
        }
    }
}

/// Query parameters of a provider callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        let Some(query) = query else {
            return params;
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() && !value.is_empty() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    Begin {
        state: String,
        return_to: String,
        now: i64,
    },
    RedirectIssued,
    Callback { params: CallbackParams, now: i64 },
    ExchangeSucceeded,
    ExchangeFailed { message: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("event {event} is not valid in flow state {state}")]
pub struct InvalidTransition {
    pub state: &'static str,
    pub event: &'static str,
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RedirectedToProvider { .. } => "redirected_to_provider",
            Self::AwaitingCallback { .. } => "awaiting_callback",
            Self::ExchangingCode { .. } => "exchanging_code",
            Self::Authenticated { .. } => "authenticated",
            Self::Failed { .. } => "failed",
        }
    }

    /// Apply `event`; `flow_ttl_seconds` bounds how long a callback is awaited.
    pub fn on(self, event: FlowEvent, flow_ttl_seconds: i64) -> Result<FlowState, InvalidTransition> {
        match (self, event) {
            // A new login may start from anywhere except mid-exchange; an
            // abandoned pending flow is simply replaced.
            (
                Self::Unauthenticated
                | Self::AwaitingCallback { .. }
                | Self::Authenticated { .. }
                | Self::Failed { .. },
                FlowEvent::Begin {
                    state,
                    return_to,
                    now,
                },
            ) => Ok(Self::RedirectedToProvider {
                state,
                return_to,
                issued_at: now,
            }),

            (
                Self::RedirectedToProvider {
                    state,
                    return_to,
                    issued_at,
                },
                FlowEvent::RedirectIssued,
            ) => Ok(Self::AwaitingCallback {
                state,
                return_to,
                issued_at,
            }),

            (
                Self::AwaitingCallback {
                    state,
                    return_to,
                    issued_at,
                },
                FlowEvent::Callback { params, now },
            ) => Ok(Self::on_callback(
                &state,
                return_to,
                issued_at,
                params,
                now,
                flow_ttl_seconds,
            )),

            // Nothing was issued to this session, so the callback is unsolicited.
            (_, FlowEvent::Callback { .. }) => Ok(Self::Failed {
                reason: FailureReason::StateMismatch,
            }),

            (Self::ExchangingCode { return_to, .. }, FlowEvent::ExchangeSucceeded) => {
                Ok(Self::Authenticated { return_to })
            }

            (Self::ExchangingCode { .. }, FlowEvent::ExchangeFailed { message }) => {
                Ok(Self::Failed {
                    reason: FailureReason::Exchange { message },
                })
            }

            (state, event) => Err(InvalidTransition {
                state: state.name(),
                event: event_name(&event),
            }),
        }
    }

    fn on_callback(
        expected_state: &str,
        return_to: String,
        issued_at: i64,
        params: CallbackParams,
        now: i64,
        flow_ttl_seconds: i64,
    ) -> FlowState {
        let fail = |reason| FlowState::Failed { reason };

        if let Some(error) = params.error {
            return fail(FailureReason::ProviderDenied {
                error,
                description: params.error_description,
            });
        }

        let state_matches = params
            .state
            .as_deref()
            .is_some_and(|got| constant_time_eq(got, expected_state));
        if !state_matches {
            return fail(FailureReason::StateMismatch);
        }

        if now.saturating_sub(issued_at) > flow_ttl_seconds {
            return fail(FailureReason::Expired);
        }

        match params.code {
            Some(code) => FlowState::ExchangingCode { code, return_to },
            None => fail(FailureReason::MissingCode),
        }
    }
}

fn event_name(event: &FlowEvent) -> &'static str {
    match event {
        FlowEvent::Begin { .. } => "begin",
        FlowEvent::RedirectIssued => "redirect_issued",
        FlowEvent::Callback { .. } => "callback",
        FlowEvent::ExchangeSucceeded => "exchange_succeeded",
        FlowEvent::ExchangeFailed { .. } => "exchange_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: i64 = 600;

    fn awaiting() -> FlowState {
        FlowState::Unauthenticated
            .on(
                FlowEvent::Begin {
                    state: "s-123".into(),
                    return_to: "/api/v1/oauth2/me".into(),
                    now: 1_000,
                },
                TTL,
            )
            .and_then(|s| s.on(FlowEvent::RedirectIssued, TTL))
            .unwrap()
    }

    fn callback(query: &str, now: i64) -> FlowEvent {
        FlowEvent::Callback {
            params: CallbackParams::from_query(Some(query)),
            now,
        }
    }

    #[test]
    fn happy_path() {
        let state = awaiting();
        assert_eq!(
            state,
            FlowState::AwaitingCallback {
                state: "s-123".into(),
                return_to: "/api/v1/oauth2/me".into(),
                issued_at: 1_000,
            }
        );

        let exchanging = state.on(callback("code=abc&state=s-123", 1_010), TTL).unwrap();
        assert_eq!(
            exchanging,
            FlowState::ExchangingCode {
                code: "abc".into(),
                return_to: "/api/v1/oauth2/me".into(),
            }
        );

        assert_eq!(
            exchanging.on(FlowEvent::ExchangeSucceeded, TTL).unwrap(),
            FlowState::Authenticated {
                return_to: "/api/v1/oauth2/me".into()
            }
        );
    }

    #[test]
    fn provider_error_wins_over_everything() {
        let failed = awaiting()
            .on(callback("error=access_denied&error_description=nope", 1_010), TTL)
            .unwrap();
        assert_eq!(
            failed,
            FlowState::Failed {
                reason: FailureReason::ProviderDenied {
                    error: "access_denied".into(),
                    description: Some("nope".into()),
                }
            }
        );
    }

    #[test]
    fn state_mismatch_and_missing_state() {
        for query in ["code=abc&state=other", "code=abc"] {
            assert_eq!(
                awaiting().on(callback(query, 1_010), TTL).unwrap(),
                FlowState::Failed {
                    reason: FailureReason::StateMismatch
                }
            );
        }
    }

    #[test]
    fn unsolicited_callback_is_a_mismatch() {
        assert_eq!(
            FlowState::Unauthenticated
                .on(callback("code=abc&state=s-123", 1_010), TTL)
                .unwrap(),
            FlowState::Failed {
                reason: FailureReason::StateMismatch
            }
        );
    }

    #[test]
    fn expired_and_missing_code() {
        assert_eq!(
            awaiting()
                .on(callback("code=abc&state=s-123", 1_000 + TTL + 1), TTL)
                .unwrap(),
            FlowState::Failed {
                reason: FailureReason::Expired
            }
        );
        assert_eq!(
            awaiting().on(callback("state=s-123", 1_010), TTL).unwrap(),
            FlowState::Failed {
                reason: FailureReason::MissingCode
            }
        );
    }

    #[test]
    fn exchange_failure() {
        let exchanging = awaiting()
            .on(callback("code=abc&state=s-123", 1_010), TTL)
            .unwrap();
        let failed = exchanging
            .on(
                FlowEvent::ExchangeFailed {
                    message: "timed out".into(),
                },
                TTL,
            )
            .unwrap();

        match failed {
            FlowState::Failed { reason } => {
                assert_eq!(
                    reason.into_error().status(),
                    axum::http::StatusCode::BAD_GATEWAY
                );
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_transitions_are_reported() {
        let err = FlowState::Unauthenticated
            .on(FlowEvent::ExchangeSucceeded, TTL)
            .unwrap_err();
        assert_eq!(
            err,
            InvalidTransition {
                state: "unauthenticated",
                event: "exchange_succeeded"
            }
        );
    }

    #[test]
    fn pending_state_round_trips_through_json() {
        let state = awaiting();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"phase\":\"awaiting_callback\""));
        assert_eq!(serde_json::from_str::<FlowState>(&json).unwrap(), state);
    }
}
