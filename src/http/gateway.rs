//! Per-request security pipeline.
//!
//! # Data Flow
//! ```text
//! request parts → RequestContext
//!     → canonical host?        → 308 redirect
//!     → API preflight?         → 204 with CORS headers
//!     → private API w/o bearer → 401
//!     → handler
//!     → browser page?          → Set-Cookie csrf_token (when absent)
//!     → security headers on whatever response came out
//! ```
//!
//! Handlers of mutating routes run the remaining checks themselves through
//! [`RequestGateway::enforce_same_origin`], [`RequestGateway::enforce_csrf_token`]
//! and [`RequestGateway::check_rate_limit`].

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{GuardConfig, RateRule};
use crate::http::context::{RequestContext, ResponseMutation};
use crate::http::error::GuardError;
use crate::observability::metrics;
use crate::security::{
    BucketStore, Clock, CsrfGuard, IdentityVerifier, Mailer, MemoryBucketStore, OriginGuard,
    RateLimitDecision, RateLimiter, SecurityHeaders,
};

/// What the gateway decided before any handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayDecision {
    /// Alternate hostname: permanent redirect to this URL.
    Redirect(String),
    Deny(GuardError),
    /// CORS preflight on an API path.
    Preflight,
    /// Run the handler; `issue_csrf` marks browser-facing pages.
    Continue { issue_csrf: bool },
}

impl GatewayDecision {
    fn label(&self) -> &'static str {
        match self {
            Self::Redirect(_) => "redirect",
            Self::Deny(_) => "deny",
            Self::Preflight => "preflight",
            Self::Continue { .. } => "continue",
        }
    }
}

/// External capabilities the gateway depends on.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub mailer: Arc<dyn Mailer>,
    /// Rate-limit bucket table.
    pub store: Box<dyn BucketStore>,
}

impl Collaborators {
    /// Collaborators with the in-process bucket table.
    pub fn new(clock: Arc<dyn Clock>, identity: Arc<dyn IdentityVerifier>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            clock,
            identity,
            mailer,
            store: Box::new(MemoryBucketStore::default()),
        }
    }

    pub fn with_store(mut self, store: Box<dyn BucketStore>) -> Self {
        self.store = store;
        self
    }
}

pub struct RequestGateway {
    config: GuardConfig,
    origin: OriginGuard,
    csrf: CsrfGuard,
    headers: SecurityHeaders,
    limiter: RateLimiter,
    identity: Arc<dyn IdentityVerifier>,
    mailer: Arc<dyn Mailer>,
}

impl RequestGateway {
    pub fn new(config: GuardConfig, collaborators: Collaborators) -> Self {
        Self {
            origin: OriginGuard::new(&config.site, &config.api),
            csrf: CsrfGuard::new(&config.csrf, config.site.production),
            headers: SecurityHeaders::from_config(&config.security, &config.site),
            limiter: RateLimiter::with_store(collaborators.store, collaborators.clock),
            identity: collaborators.identity,
            mailer: collaborators.mailer,
            config,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn origin(&self) -> &OriginGuard {
        &self.origin
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn identity(&self) -> &dyn IdentityVerifier {
        self.identity.as_ref()
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    /// Decide what happens to a request before routing.
    pub fn evaluate(&self, ctx: &RequestContext) -> GatewayDecision {
        if let Some(location) = self.origin.canonical_redirect(ctx) {
            return GatewayDecision::Redirect(location);
        }

        let is_api = self.origin.is_api_path(&ctx.path);
        if is_api && ctx.method == axum::http::Method::OPTIONS {
            return GatewayDecision::Preflight;
        }

        if let Err(e) = self.origin.enforce_api_auth(ctx) {
            return GatewayDecision::Deny(e);
        }

        GatewayDecision::Continue { issue_csrf: !is_api }
    }

    pub fn enforce_same_origin(&self, ctx: &RequestContext) -> Result<(), GuardError> {
        self.origin.enforce_same_origin(ctx)
    }

    pub fn enforce_csrf_token(&self, ctx: &RequestContext) -> Result<(), GuardError> {
        self.csrf.enforce_csrf_token(ctx)
    }

    /// Run a quota check unless rate limiting is disabled.
    ///
    /// `action` labels the metric; `key` should combine action and identity.
    pub fn check_rate_limit(&self, action: &'static str, key: &str, rule: RateRule) -> Option<RateLimitDecision> {
        if !self.config.rate_limit.enabled {
            return None;
        }
        let decision = self.limiter.check(key, rule.limit, rule.window_ms);
        if !decision.allowed {
            metrics::record_rate_limited(action);
        }
        Some(decision)
    }

    /// Attach the CSRF cookie (when absent) and the security headers.
    fn finish(&self, ctx: &RequestContext, issue_csrf: bool, response: &mut Response) {
        if issue_csrf {
            let mut mutation = ResponseMutation::new();
            self.csrf
                .ensure_csrf_cookie(ctx.cookie(self.csrf.cookie_name()), &mut mutation);
            mutation.apply(response);
        }
        self.headers.apply(response);
    }
}

/// Axum middleware wrapping every route.
pub async fn gateway_middleware(
    State(gateway): State<Arc<RequestGateway>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let (parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts, gateway.config.security.trust_forwarded_for);
    let request = Request::from_parts(parts, body);

    let decision = gateway.evaluate(&ctx);
    metrics::record_gateway_decision(decision.label());

    let mut issue_csrf = false;
    let mut response = match decision {
        GatewayDecision::Redirect(location) => {
            tracing::debug!(request_id = %ctx.request_id, location = %location, "Redirecting to canonical host");
            match HeaderValue::from_str(&location) {
                Ok(value) => (StatusCode::PERMANENT_REDIRECT, [(header::LOCATION, value)]).into_response(),
                Err(_) => GuardError::MalformedPayload("unrepresentable redirect target".into()).into_response(),
            }
        }
        GatewayDecision::Deny(error) => {
            tracing::warn!(
                request_id = %ctx.request_id,
                method = %ctx.method,
                path = %ctx.path,
                client = %ctx.client_key(),
                error = %error,
                "Request denied at gateway"
            );
            error.into_response()
        }
        GatewayDecision::Preflight => gateway.origin.preflight(gateway.csrf.header_name()).into_response(),
        GatewayDecision::Continue { issue_csrf: issue } => {
            issue_csrf = issue;
            next.run(request).await
        }
    };

    gateway.finish(&ctx, issue_csrf, &mut response);
    metrics::record_request(ctx.method.as_str(), response.status().as_u16(), start);
    response
}
