//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the request guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Site identity: canonical origin, alternate hosts, environment.
    pub site: SiteConfig,

    /// Response hardening and request ceilings.
    pub security: SecurityConfig,

    /// API surface: prefix and public allow-list.
    pub api: ApiConfig,

    /// Double-submit CSRF cookie settings.
    pub csrf: CsrfConfig,

    /// Per-route rate limits.
    pub rate_limit: RateLimitConfig,

    /// Inbound webhook verification.
    pub webhook: WebhookConfig,

    /// Bearer tokens accepted by the built-in identity verifier.
    pub identity: IdentityConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Canonical origin, scheme + host (+ port), no path.
    pub canonical_origin: String,

    /// Hostnames redirected to the canonical origin (apex or `www`).
    pub alternate_hosts: Vec<String>,

    /// Production mode: enables HSTS and `Secure` cookies.
    pub production: bool,

    /// Where password-reset emails send the user.
    pub password_reset_redirect: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            canonical_origin: "http://localhost:8080".to_string(),
            alternate_hosts: Vec::new(),
            production: false,
            password_reset_redirect: "http://localhost:8080/account/reset".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Attach security headers to every response.
    pub enable_headers: bool,

    /// Maximum body size read by handlers, in bytes.
    pub max_body_size: usize,

    /// Content-Security-Policy value.
    pub content_security_policy: String,

    /// Permissions-Policy value.
    pub permissions_policy: String,

    /// HSTS max-age (production only).
    pub hsts_max_age_secs: u64,

    /// Use the first `X-Forwarded-For` entry as the client IP.
    pub trust_forwarded_for: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 64 * 1024,
            content_security_policy: "default-src 'self'; img-src 'self' data: https:; \
                 style-src 'self' 'unsafe-inline'; frame-ancestors 'none'; base-uri 'self'; \
                 form-action 'self'"
                .to_string(),
            permissions_policy: "camera=(), microphone=(), geolocation=(), payment=(self)"
                .to_string(),
            hsts_max_age_secs: 63_072_000, // 2 years
            trust_forwarded_for: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Path prefix identifying API routes.
    pub prefix: String,

    /// API paths reachable without bearer credentials.
    /// Entries ending in `/` match as prefixes, others exactly.
    pub public_paths: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api/".to_string(),
            public_paths: vec![
                "/api/health".to_string(),
                "/api/auth/password-reset".to_string(),
                "/api/contact".to_string(),
                "/api/webhooks/".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub cookie_name: String,
    pub header_name: String,
    pub max_age_secs: u64,
    /// Random bytes per token (before encoding).
    pub token_bytes: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: "csrf_token".to_string(),
            header_name: "x-csrf-token".to_string(),
            max_age_secs: 365 * 24 * 3600,
            token_bytes: 32,
        }
    }
}

/// A single limit: `limit` requests per `window_ms`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateRule {
    pub limit: u32,
    pub window_ms: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Per email + IP.
    pub password_reset: RateRule,

    /// Per IP.
    pub contact: RateRule,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            password_reset: RateRule {
                limit: 5,
                window_ms: 3_600_000,
            },
            contact: RateRule {
                limit: 3,
                window_ms: 600_000,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared HMAC secret. Usually supplied via `GUARD_WEBHOOK_SECRET`.
    pub secret: String,

    /// Header carrying the signature.
    pub signature_header: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            signature_header: "x-signature".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    pub tokens: Vec<ApiTokenConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiTokenConfig {
    pub token: String,
    pub subject: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
