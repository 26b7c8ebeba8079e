//! Provider configuration
//!
//! The `provider` block of a manifest: target region, optional named
//! profile and operation timeouts.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schemas::types::{is_valid_region, normalize_region};

/// Default timeout while waiting for an image to become available
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(40 * 60);

/// Default timeout while waiting for an image to be gone
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(90 * 60);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid region '{0}'")]
    InvalidRegion(String),

    #[error("Invalid duration '{value}' for timeouts.{field}: {reason}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Timeouts as written in the manifest (`"40m"`, `"1h30m"`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

/// Resolved operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_CREATE_TIMEOUT,
            delete: DEFAULT_DELETE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            profile: None,
            timeouts: TimeoutsConfig::default(),
        }
    }

    /// Region in AWS format, rejecting unknown regions
    pub fn region(&self) -> Result<String, ConfigError> {
        let region = normalize_region(&self.region);
        if is_valid_region(&region) {
            Ok(region)
        } else {
            Err(ConfigError::InvalidRegion(self.region.clone()))
        }
    }

    pub fn timeouts(&self) -> Result<Timeouts, ConfigError> {
        let resolve = |field: &'static str, raw: &Option<String>, default: Duration| match raw {
            None => Ok(default),
            Some(value) => parse_duration(value).map_err(|reason| ConfigError::InvalidDuration {
                field,
                value: value.clone(),
                reason,
            }),
        };

        Ok(Timeouts {
            create: resolve("create", &self.timeouts.create, DEFAULT_CREATE_TIMEOUT)?,
            delete: resolve("delete", &self.timeouts.delete, DEFAULT_DELETE_TIMEOUT)?,
        })
    }

    /// Check the whole block, collecting the first error
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.region()?;
        self.timeouts()?;
        Ok(())
    }
}

/// Parse a duration made of `<n>h`, `<n>m` and `<n>s` parts, e.g. `1h30m`
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            other => return Err(format!("unknown unit '{}'", other)),
        };
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("missing number before '{}'", c))?;
        total += n * unit;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("missing unit after '{}'", digits));
    }
    Ok(Duration::from_secs(total))
}
