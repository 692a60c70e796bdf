//! Security response headers.
//!
//! # Responsibilities
//! - Build the fixed header set once from config
//! - Attach it to every response, including redirects and denials
//!
//! # Design Decisions
//! - HSTS only in production (local http would otherwise be pinned)
//! - Header values validated at construction; invalid config values are
//!   skipped with a warning rather than failing requests

use axum::http::{header, HeaderName, HeaderValue};
use axum::response::Response;

use crate::config::{SecurityConfig, SiteConfig};

pub const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");
pub const CROSS_ORIGIN_OPENER_POLICY: HeaderName = HeaderName::from_static("cross-origin-opener-policy");
pub const CROSS_ORIGIN_RESOURCE_POLICY: HeaderName =
    HeaderName::from_static("cross-origin-resource-policy");

#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn from_config(security: &SecurityConfig, site: &SiteConfig) -> Self {
        if !security.enable_headers {
            return Self { headers: Vec::new() };
        }

        let mut headers = Vec::new();
        push_dynamic(
            &mut headers,
            header::CONTENT_SECURITY_POLICY,
            &security.content_security_policy,
        );
        headers.push((header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")));
        headers.push((header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
        headers.push((
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));
        push_dynamic(&mut headers, PERMISSIONS_POLICY, &security.permissions_policy);
        headers.push((CROSS_ORIGIN_OPENER_POLICY, HeaderValue::from_static("same-origin")));
        headers.push((CROSS_ORIGIN_RESOURCE_POLICY, HeaderValue::from_static("same-origin")));

        if site.production {
            push_dynamic(
                &mut headers,
                header::STRICT_TRANSPORT_SECURITY,
                &format!("max-age={}; includeSubDomains", security.hsts_max_age_secs),
            );
        }

        Self { headers }
    }

    pub fn apply(&self, response: &mut Response) {
        let target = response.headers_mut();
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

fn push_dynamic(headers: &mut Vec<(HeaderName, HeaderValue)>, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => headers.push((name, value)),
        Err(_) => tracing::warn!(header = %name, "Skipping security header with invalid value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn applied(site: &SiteConfig) -> Response {
        let headers = SecurityHeaders::from_config(&SecurityConfig::default(), site);
        let mut response = Response::new(Body::empty());
        headers.apply(&mut response);
        response
    }

    #[test]
    fn test_baseline_headers_present() {
        let response = applied(&SiteConfig::default());
        let h = response.headers();
        assert!(h.contains_key(header::CONTENT_SECURITY_POLICY));
        assert_eq!(h.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
        assert_eq!(h.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(h.get(header::REFERRER_POLICY).unwrap(), "strict-origin-when-cross-origin");
        assert!(h.contains_key("permissions-policy"));
        assert_eq!(h.get("cross-origin-opener-policy").unwrap(), "same-origin");
        assert_eq!(h.get("cross-origin-resource-policy").unwrap(), "same-origin");
        assert!(!h.contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn test_hsts_only_in_production() {
        let site = SiteConfig {
            production: true,
            ..SiteConfig::default()
        };
        let response = applied(&site);
        assert_eq!(
            response.headers().get(header::STRICT_TRANSPORT_SECURITY).unwrap(),
            "max-age=63072000; includeSubDomains"
        );
    }

    #[test]
    fn test_disabled_headers() {
        let security = SecurityConfig {
            enable_headers: false,
            ..SecurityConfig::default()
        };
        assert!(SecurityHeaders::from_config(&security, &SiteConfig::default()).is_empty());
    }

    #[test]
    fn test_invalid_csp_is_skipped() {
        let security = SecurityConfig {
            content_security_policy: "default-src 'self'\n".into(),
            ..SecurityConfig::default()
        };
        let headers = SecurityHeaders::from_config(&security, &SiteConfig::default());
        let mut response = Response::new(Body::empty());
        headers.apply(&mut response);
        assert!(!response.headers().contains_key(header::CONTENT_SECURITY_POLICY));
        assert!(response.headers().contains_key(header::X_FRAME_OPTIONS));
    }
}
