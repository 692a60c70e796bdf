//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, token sizes)
//! - Check that origins, header and cookie names are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GuardConfig, RateRule};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("site.canonical_origin `{0}` must be an http(s) origin without a path")]
    InvalidOrigin(String),

    #[error("site.alternate_hosts entry `{0}` is not a bare hostname")]
    InvalidAlternateHost(String),

    #[error("api.prefix `{0}` must start and end with `/`")]
    InvalidApiPrefix(String),

    #[error("{0}.window_ms must be greater than zero")]
    ZeroWindow(&'static str),

    #[error("csrf.token_bytes must be at least 16, got {0}")]
    WeakCsrfToken(usize),

    #[error("csrf.cookie_name `{0}` is not a valid cookie name")]
    InvalidCookieName(String),

    #[error("{field} `{value}` is not a valid header name")]
    InvalidHeaderName { field: &'static str, value: String },

    #[error("webhook.secret must be set in production")]
    MissingWebhookSecret,

    #[error("security.max_body_size must be greater than zero")]
    ZeroBodyLimit,
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !is_valid_origin(&config.site.canonical_origin) {
        errors.push(ValidationError::InvalidOrigin(config.site.canonical_origin.clone()));
    }

    for host in &config.site.alternate_hosts {
        if host.is_empty() || host.contains(['/', ':', ' ']) {
            errors.push(ValidationError::InvalidAlternateHost(host.clone()));
        }
    }

    let prefix = &config.api.prefix;
    if !(prefix.starts_with('/') && prefix.ends_with('/')) {
        errors.push(ValidationError::InvalidApiPrefix(prefix.clone()));
    }

    check_rule("rate_limit.password_reset", config.rate_limit.password_reset, &mut errors);
    check_rule("rate_limit.contact", config.rate_limit.contact, &mut errors);

    if config.csrf.token_bytes < 16 {
        errors.push(ValidationError::WeakCsrfToken(config.csrf.token_bytes));
    }

    if !is_valid_cookie_name(&config.csrf.cookie_name) {
        errors.push(ValidationError::InvalidCookieName(config.csrf.cookie_name.clone()));
    }

    for (field, value) in [
        ("csrf.header_name", &config.csrf.header_name),
        ("webhook.signature_header", &config.webhook.signature_header),
    ] {
        if HeaderName::from_bytes(value.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName {
                field,
                value: value.clone(),
            });
        }
    }

    if config.site.production && config.webhook.secret.is_empty() {
        errors.push(ValidationError::MissingWebhookSecret);
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_rule(name: &'static str, rule: RateRule, errors: &mut Vec<ValidationError>) {
    if rule.window_ms == 0 {
        errors.push(ValidationError::ZeroWindow(name));
    }
}

fn is_valid_origin(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().is_some()
                && url.path() == "/"
                && !origin.ends_with('/')
                && url.query().is_none()
                && url.fragment().is_none()
        }
        Err(_) => false,
    }
}

// RFC 6265 token: visible ASCII minus separators.
fn is_valid_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GuardConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GuardConfig::default();
        config.site.canonical_origin = "ftp://example.com".into();
        config.api.prefix = "/api".into();
        config.rate_limit.contact.window_ms = 0;
        config.csrf.token_bytes = 8;
        config.csrf.cookie_name = "bad name".into();
        config.csrf.header_name = "bad header".into();
        config.security.max_body_size = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 7);
        assert!(errors.contains(&ValidationError::ZeroWindow("rate_limit.contact")));
        assert!(errors.contains(&ValidationError::WeakCsrfToken(8)));
    }

    #[test]
    fn test_origin_rules() {
        assert!(is_valid_origin("https://example.com"));
        assert!(is_valid_origin("http://localhost:8080"));
        assert!(!is_valid_origin("https://example.com/"));
        assert!(!is_valid_origin("https://example.com/blog"));
        assert!(!is_valid_origin("example.com"));
    }

    #[test]
    fn test_production_requires_webhook_secret() {
        let mut config = GuardConfig::default();
        config.site.production = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MissingWebhookSecret])
        );

        config.webhook.secret = "whsec".into();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_alternate_hosts_must_be_bare() {
        let mut config = GuardConfig::default();
        config.site.alternate_hosts = vec!["www.example.com".into(), "https://example.com".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidAlternateHost("https://example.com".into())]
        );
    }
}
