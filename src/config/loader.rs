//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the environment, and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with the override source supplied by the caller.
pub fn load_config_with<F>(path: &Path, lookup: F) -> Result<GuardConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = fs::read_to_string(path)?;
    let mut config: GuardConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, lookup);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn load_from_env() -> Result<GuardConfig, ConfigError> {
    let mut config = GuardConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `GUARD_*` overrides. `lookup` abstracts the environment for tests.
pub fn apply_env_overrides<F>(config: &mut GuardConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("GUARD_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("GUARD_SITE_ORIGIN") {
        config.site.canonical_origin = v;
    }
    if let Some(v) = lookup("GUARD_PASSWORD_RESET_REDIRECT") {
        config.site.password_reset_redirect = v;
    }
    if let Some(v) = lookup("GUARD_WEBHOOK_SECRET") {
        config.webhook.secret = v;
    }
    if let Some(v) = lookup("GUARD_PRODUCTION") {
        config.site.production = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GUARD_SITE_ORIGIN", "https://example.org"),
            ("GUARD_WEBHOOK_SECRET", "s3cret"),
            ("GUARD_PRODUCTION", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = GuardConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.site.canonical_origin, "https://example.org");
        assert_eq!(config.webhook.secret, "s3cret");
        assert!(config.site.production);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("guard-{}.toml", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[site]\ncanonical_origin = \"https://example.com\"\n[webhook]\nsecret = \"abc\""
        )
        .unwrap();

        let config = load_config_with(&path, |_| None).unwrap();
        assert_eq!(config.site.canonical_origin, "https://example.com");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_config_reports_validation_errors() {
        let path = std::env::temp_dir().join(format!("guard-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[csrf]\ntoken_bytes = 4\n[api]\nprefix = \"api\"\n").unwrap();

        match load_config_with(&path, |_| None) {
            Err(ConfigError::Validation(errors)) => assert!(errors.len() >= 2),
            other => panic!("expected validation failure, got {:?}", other),
        }
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_config_with_applies_lookup_after_file() {
        let path = std::env::temp_dir().join(format!("guard-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[site]\ncanonical_origin = \"https://example.com\"\n").unwrap();

        let config = load_config_with(&path, |key| {
            (key == "GUARD_SITE_ORIGIN").then(|| "https://www.example.com".to_string())
        })
        .unwrap();
        assert_eq!(config.site.canonical_origin, "https://www.example.com");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/guard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
