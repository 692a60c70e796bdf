//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → origin.rs (canonical host redirect, bearer presence on private API paths)
//!     → csrf.rs (issue cookie on pages; verify header == cookie on mutations)
//!     → rate_limit.rs (per-route fixed-window quotas)
//!     → signature.rs (webhook routes only: HMAC over the raw body)
//!     → headers.rs (security headers on every response)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Time and identity are injected (clock.rs, identity.rs)

pub mod clock;
pub mod csrf;
pub mod headers;
pub mod identity;
pub mod origin;
pub mod rate_limit;
pub mod signature;

pub use clock::{Clock, ManualClock, SystemClock};
pub use csrf::CsrfGuard;
pub use headers::SecurityHeaders;
pub use identity::{Identity, IdentityError, IdentityVerifier, MailError, Mailer};
pub use origin::OriginGuard;
pub use rate_limit::{BucketStore, MemoryBucketStore, RateBucket, RateLimitDecision, RateLimiter};
pub use signature::{sign_hmac_sha256, verify_hmac_sha256_signature};
