//! CSRF protection using the double-submit cookie pattern.
//!
//! A random token lives in a script-readable cookie. Browser code echoes it
//! in a request header on state-changing calls. A cross-origin page can make
//! the browser send the cookie but cannot read it, so it cannot produce the
//! matching header. There is no server-side token registry.

use axum::http::{header, HeaderName, HeaderValue, Method};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::config::CsrfConfig;
use crate::http::context::{RequestContext, ResponseMutation};
use crate::http::error::GuardError;
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct CsrfGuard {
    cookie_name: String,
    header_name: HeaderName,
    max_age_secs: u64,
    token_bytes: usize,
    secure: bool,
}

impl CsrfGuard {
    /// `secure` adds the `Secure` cookie attribute (production over https).
    pub fn new(config: &CsrfConfig, secure: bool) -> Self {
        let header_name = HeaderName::from_bytes(config.header_name.as_bytes())
            .unwrap_or(HeaderName::from_static("x-csrf-token"));
        Self {
            cookie_name: config.cookie_name.clone(),
            header_name,
            max_age_secs: config.max_age_secs,
            token_bytes: config.token_bytes,
            secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header_name
    }

    /// A fresh URL-safe token from the thread-local CSPRNG.
    pub fn generate_token(&self) -> String {
        let mut bytes = vec![0u8; self.token_bytes];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Issue a token cookie when the browser has none.
    ///
    /// Returns the token in effect after the call: the existing one, or the
    /// newly issued one.
    pub fn ensure_csrf_cookie(&self, current: Option<&str>, response: &mut ResponseMutation) -> String {
        if let Some(existing) = current.filter(|value| !value.is_empty()) {
            return existing.to_string();
        }

        let token = self.generate_token();
        match HeaderValue::from_str(&self.set_cookie_value(&token)) {
            Ok(value) => response.append_header(header::SET_COOKIE, value),
            Err(_) => tracing::warn!(cookie = %self.cookie_name, "CSRF cookie could not be encoded"),
        }
        token
    }

    fn set_cookie_value(&self, token: &str) -> String {
        // Deliberately not HttpOnly: client script must read and echo it.
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Lax",
            self.cookie_name, token, self.max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Verify the header token against the cookie token.
    ///
    /// Safe methods pass without a check.
    pub fn enforce_csrf_token(&self, ctx: &RequestContext) -> Result<(), GuardError> {
        if matches!(
            ctx.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        ) {
            return Ok(());
        }

        let header_token = ctx.header(self.header_name.as_str()).filter(|t| !t.is_empty());
        let cookie_token = ctx.cookie(&self.cookie_name).filter(|t| !t.is_empty());

        let reason = match (header_token, cookie_token) {
            (None, _) => "missing CSRF header",
            (_, None) => "missing CSRF cookie",
            (Some(h), Some(c)) if tokens_match(h, c) => return Ok(()),
            _ => "CSRF token mismatch",
        };

        tracing::warn!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            path = %ctx.path,
            reason,
            "CSRF validation failed"
        );
        metrics::record_csrf_rejection(reason);
        Err(GuardError::Forbidden(reason))
    }
}

fn tokens_match(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(&CsrfConfig::default(), false)
    }

    fn ctx(method: Method, cookie: Option<&str>, header_value: Option<&str>) -> RequestContext {
        let mut builder = Request::builder().method(method).uri("/api/contact");
        if let Some(c) = cookie {
            builder = builder.header("cookie", format!("csrf_token={}", c));
        }
        if let Some(h) = header_value {
            builder = builder.header("x-csrf-token", h);
        }
        let (parts, _) = builder.body(Body::empty()).unwrap().into_parts();
        RequestContext::from_parts(&parts, false)
    }

    #[test]
    fn test_token_shape() {
        let guard = guard();
        let token = guard.generate_token();
        assert_eq!(token.len(), 43);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, guard.generate_token());
    }

    #[test]
    fn test_issues_cookie_when_absent() {
        let guard = guard();
        let mut response = ResponseMutation::new();
        let token = guard.ensure_csrf_cookie(None, &mut response);

        let cookie = response.header("set-cookie").unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("csrf_token={};", token)));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=31536000"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_secure_attribute_in_production() {
        let guard = CsrfGuard::new(&CsrfConfig::default(), true);
        let mut response = ResponseMutation::new();
        guard.ensure_csrf_cookie(Some(""), &mut response);
        assert!(response.header("set-cookie").unwrap().to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn test_existing_cookie_left_alone() {
        let guard = guard();
        let mut response = ResponseMutation::new();
        let token = guard.ensure_csrf_cookie(Some("existing-token"), &mut response);
        assert_eq!(token, "existing-token");
        assert!(response.is_empty());
    }

    #[test]
    fn test_matching_tokens_pass() {
        assert!(guard().enforce_csrf_token(&ctx(Method::POST, Some("abc"), Some("abc"))).is_ok());
    }

    #[test]
    fn test_mismatch_and_absence_fail() {
        let guard = guard();
        for (cookie, header_value) in [
            (Some("abc"), Some("abd")),
            (Some("abc"), Some("abcd")),
            (None, Some("abc")),
            (Some("abc"), None),
            (None, None),
            (Some(""), Some("")),
        ] {
            let result = guard.enforce_csrf_token(&ctx(Method::POST, cookie, header_value));
            assert!(
                matches!(result, Err(GuardError::Forbidden(_))),
                "cookie={:?} header={:?} should fail",
                cookie,
                header_value
            );
        }
    }

    #[test]
    fn test_safe_methods_skip_verification() {
        let guard = guard();
        assert!(guard.enforce_csrf_token(&ctx(Method::GET, None, None)).is_ok());
        assert!(guard.enforce_csrf_token(&ctx(Method::OPTIONS, None, None)).is_ok());
        assert!(guard.enforce_csrf_token(&ctx(Method::DELETE, None, None)).is_err());
    }
}
