pub mod flow;
pub mod handler;
pub mod provider;

pub use flow::{CallbackParams, FailureReason, FlowEvent, FlowState, InvalidTransition};
pub use handler::{FLOW_KEY, LOGIN_KEY, OAuth2AuthHandler, OAuth2Login};
pub use provider::{AuthorizeRequest, HttpOAuth2Provider, OAuth2Provider, ProviderError, TokenSet};
