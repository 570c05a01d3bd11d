pub mod auth;
pub mod negotiation;
pub mod session;
