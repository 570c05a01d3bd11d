//! routegate: content negotiation and pluggable authentication for axum.
//!
//! - `services::negotiation`: header parsing, ranking and negotiation
//! - `services::auth`: Basic, Digest, JWT, redirect/form, OAuth2 and chained handlers
//! - `services::session`: session stores backing the interactive flows
//! - `app`: wiring of the demo HTTP service

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod services;
pub mod state;
