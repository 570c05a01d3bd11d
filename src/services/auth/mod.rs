pub mod basic;
pub mod chain;
pub mod credentials;
pub mod digest;
pub mod handler;
pub mod jwt;
pub mod oauth2;
pub mod redirect;
pub mod secret;

pub use basic::BasicAuthHandler;
pub use chain::ChainAuthHandler;
pub use credentials::{CredentialStore, MemoryCredentialStore, UserRecord};
pub use digest::DigestAuthHandler;
pub use handler::{
    AuthError, AuthHandler, AuthOutcome, AuthRequest, AuthScheme, Authorities, Principal,
    authorize,
};
pub use jwt::{JwtAuthHandler, JwtKey};
pub use oauth2::{HttpOAuth2Provider, OAuth2AuthHandler, OAuth2Provider};
pub use redirect::RedirectAuthHandler;
