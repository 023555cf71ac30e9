//! Environment inputs: target region and a per-run name prefix.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Variable holding the target region.
pub const REGION_ENV: &str = "AWS_REGION";

/// Variable used to seed the name prefix in CI.
pub const PREFIX_ENV: &str = "GITHUB_SHA";

const PREFIX_SEED_LEN: usize = 5;

/// Region and name prefix for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Target region.
    pub region: String,
    /// Prefix applied to resource names to avoid collisions across runs.
    pub prefix: String,
}

impl EnvConfig {
    /// Creates a config from explicit values.
    pub fn new(region: impl Into<String>, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self {
            region: region.into(),
            prefix,
        })
    }

    /// Loads the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var(REGION_ENV).ok(),
            std::env::var(PREFIX_ENV).ok(),
        )
    }

    /// Builds the config from raw variable values.
    ///
    /// Empty values are treated as unset.
    pub fn from_vars(region: Option<String>, sha: Option<String>) -> Result<Self, ConfigError> {
        let region = region
            .filter(|r| !r.is_empty())
            .ok_or(ConfigError::MissingRegion)?;
        let prefix = derive_prefix(sha.as_deref());
        tracing::info!(prefix = %prefix, region = %region, "using prefix: {}", prefix);
        Ok(Self { region, prefix })
    }
}

/// Derives a resource-name prefix.
///
/// The seed is the first five characters of `sha` when present, otherwise a
/// random number below 10000. The result always starts with `a` since
/// resource names must start with a letter.
#[must_use]
pub fn derive_prefix(sha: Option<&str>) -> String {
    let seed = match sha.filter(|s| !s.is_empty()) {
        Some(sha) => sha.chars().take(PREFIX_SEED_LEN).collect::<String>(),
        None => rand::thread_rng().gen_range(0..10_000).to_string(),
    };
    format!("a{seed}")
}

/// Checks that a prefix is usable in resource names.
pub fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    let mut chars = prefix.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if starts_with_letter && chars.all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ConfigError::InvalidPrefix(prefix.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_from_sha_truncated() {
        assert_eq!(derive_prefix(Some("0f3c9a1b2d")), "a0f3c9");
        assert_eq!(derive_prefix(Some("abc")), "aabc");
    }

    #[test]
    fn test_prefix_random_when_unset() {
        for sha in [None, Some("")] {
            let prefix = derive_prefix(sha);
            assert!(prefix.starts_with('a'));
            let n: u32 = prefix[1..].parse().unwrap();
            assert!(n < 10_000);
            validate_prefix(&prefix).unwrap();
        }
    }

    #[test]
    fn test_from_vars_requires_region() {
        let err = EnvConfig::from_vars(None, Some("deadbeef".into())).unwrap_err();
        assert_eq!(err, ConfigError::MissingRegion);
        assert!(err.is_skip());

        let err = EnvConfig::from_vars(Some(String::new()), None).unwrap_err();
        assert_eq!(err, ConfigError::MissingRegion);
    }

    #[test]
    fn test_from_vars() {
        let config = EnvConfig::from_vars(Some("us-west-2".into()), Some("deadbeef".into())).unwrap();
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.prefix, "adeadb");
    }

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("a1234").is_ok());
        assert!(validate_prefix("1234").is_err());
        assert!(validate_prefix("a-12").is_err());
        assert!(validate_prefix("").is_err());
    }

    #[test]
    fn test_new_validates_prefix() {
        assert!(EnvConfig::new("eu-west-1", "a42").is_ok());
        assert_eq!(
            EnvConfig::new("eu-west-1", "42"),
            Err(ConfigError::InvalidPrefix("42".into()))
        );
    }
}
