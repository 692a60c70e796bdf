//! Request defense middleware for a public website API.
//!
//! Rate limiting, webhook signature verification, double-submit CSRF, same-origin
//! checks, canonical-host redirects and security headers, composed into one
//! Axum gateway.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GuardConfig;
pub use http::{HttpServer, RequestGateway};
pub use lifecycle::Shutdown;
