//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID set + propagated)
//!     → gateway.rs (redirect, preflight, bearer presence, CSRF cookie, headers)
//!     → handlers.rs (origin, CSRF, rate limit, signature, identity)
//!     → Send to client
//! ```

pub mod context;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod request;
pub mod server;

pub use context::{RequestContext, ResponseMutation};
pub use error::GuardError;
pub use gateway::{gateway_middleware, Collaborators, GatewayDecision, RequestGateway};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
