//! Same-origin, bearer-presence and canonical-host enforcement.
//!
//! # Responsibilities
//! - Classify paths (API vs browser-facing, public allow-list)
//! - Require a syntactically valid bearer header on non-public API paths
//! - Check `Origin`/`Referer` against the canonical site origin
//! - Redirect alternate hostnames to the canonical origin
//! - Answer CORS preflights without running any other check
//!
//! # Design Decisions
//! - Bearer validity is NOT checked here; that belongs to the identity provider
//! - Origins are compared after URL normalization (default ports elided)

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

use crate::config::{ApiConfig, SiteConfig};
use crate::http::context::{RequestContext, ResponseMutation};
use crate::http::error::GuardError;

#[derive(Debug, Clone)]
pub struct OriginGuard {
    canonical_origin: String,
    allowed_origins: Vec<String>,
    alternate_hosts: Vec<String>,
    api_prefix: String,
    public_paths: Vec<String>,
}

impl OriginGuard {
    pub fn new(site: &SiteConfig, api: &ApiConfig) -> Self {
        let canonical_origin = normalize_origin(&site.canonical_origin)
            .unwrap_or_else(|| site.canonical_origin.trim_end_matches('/').to_string());
        let scheme = Url::parse(&canonical_origin)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());

        let alternate_hosts: Vec<String> = site
            .alternate_hosts
            .iter()
            .map(|h| h.to_ascii_lowercase())
            .collect();

        let mut allowed_origins = vec![canonical_origin.clone()];
        allowed_origins.extend(
            alternate_hosts
                .iter()
                .filter_map(|host| normalize_origin(&format!("{}://{}", scheme, host))),
        );

        Self {
            canonical_origin,
            allowed_origins,
            alternate_hosts,
            api_prefix: api.prefix.clone(),
            public_paths: api.public_paths.clone(),
        }
    }

    pub fn canonical_origin(&self) -> &str {
        &self.canonical_origin
    }

    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(&self.api_prefix) || path == self.api_prefix.trim_end_matches('/')
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|entry| {
            if entry.ends_with('/') {
                path.starts_with(entry.as_str())
            } else {
                path == entry
            }
        })
    }

    /// Coarse perimeter check for API routes.
    ///
    /// Non-public API paths need a bearer header or must be a preflight.
    pub fn enforce_api_auth(&self, ctx: &RequestContext) -> Result<(), GuardError> {
        if !self.is_api_path(&ctx.path) || self.is_public_path(&ctx.path) {
            return Ok(());
        }
        if ctx.method == Method::OPTIONS || has_bearer_auth(ctx) {
            return Ok(());
        }
        Err(GuardError::Unauthorized("bearer token required"))
    }

    /// Require the request to come from a page on this site.
    pub fn enforce_same_origin(&self, ctx: &RequestContext) -> Result<(), GuardError> {
        let claimed = match ctx.header(header::ORIGIN.as_str()) {
            Some(origin) => normalize_origin(origin),
            None => ctx.header(header::REFERER.as_str()).and_then(normalize_origin),
        };

        match claimed {
            Some(origin) if self.allowed_origins.iter().any(|allowed| *allowed == origin) => Ok(()),
            claimed => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    path = %ctx.path,
                    origin = ?claimed,
                    "Same-origin check failed"
                );
                Err(GuardError::Unauthorized("cross-origin request rejected"))
            }
        }
    }

    /// Target URL when the request arrived on an alternate hostname.
    pub fn canonical_redirect(&self, ctx: &RequestContext) -> Option<String> {
        let host = strip_port(ctx.host()?).to_ascii_lowercase();
        if !self.alternate_hosts.contains(&host) {
            return None;
        }

        let mut location = format!("{}{}", self.canonical_origin, ctx.path);
        if let Some(query) = &ctx.query {
            location.push('?');
            location.push_str(query);
        }
        Some(location)
    }

    /// `204` preflight answer with permissive CORS headers for this origin.
    pub fn preflight(&self, csrf_header: &HeaderName) -> ResponseMutation {
        let mut response = ResponseMutation::with_status(StatusCode::NO_CONTENT);
        if let Ok(origin) = HeaderValue::from_str(&self.canonical_origin) {
            response.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        response.set_header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, PATCH, DELETE, OPTIONS"),
        );
        if let Ok(allowed) =
            HeaderValue::from_str(&format!("authorization, content-type, {}", csrf_header))
        {
            response.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, allowed);
        }
        response.set_header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        response.set_header(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
        response.set_header(header::VARY, HeaderValue::from_static("Origin"));
        response
    }
}

/// True when `Authorization` is `Bearer <token68>`. Token validity is not checked.
pub fn has_bearer_auth(ctx: &RequestContext) -> bool {
    bearer_token(ctx).is_some()
}

/// The bearer token, when the header is syntactically valid.
pub fn bearer_token(ctx: &RequestContext) -> Option<&str> {
    let value = ctx.header(header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim_start();
    let body = token.trim_end_matches('=');
    let valid = !body.is_empty()
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-._~+/".contains(&b));
    valid.then_some(token)
}

fn normalize_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
