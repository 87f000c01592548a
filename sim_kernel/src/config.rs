//! Kernel configuration
//!
//! All tunables live in one serde structure that is injected into
//! [`SimulatedKernel::with_config`](crate::SimulatedKernel::with_config).
//! Missing fields fall back to their defaults, so a config file only needs
//! to name what it changes:
//!
//! ```json
//! { "universe_capacity": 64, "access_validation": "Deferred" }
//! ```

use ipc::MAX_NESTING_DEPTH;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Upper bound accepted for `max_inline_bytes`
pub const INLINE_LIMIT: usize = 16 * 1024 * 1024;

/// When foreign-address-space accessors validate their range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessValidation {
    /// Check residency and permissions when the accessor is acquired
    #[default]
    Eager,
    /// Only check when bytes are actually copied
    Deferred,
}

/// Kernel tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Largest payload a `RecvInline` may receive
    pub max_inline_bytes: usize,
    /// Live handles per universe
    pub universe_capacity: usize,
    /// Nesting levels a submitted chain may use, counting the chain itself
    pub max_chain_depth: usize,
    pub access_validation: AccessValidation,
    /// Capacity of the kernel log ring
    pub log_ring_bytes: usize,
    pub log_level: LevelFilter,
    /// Record IPC audit events
    pub audit: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_inline_bytes: 64 * 1024,
            universe_capacity: 4096,
            max_chain_depth: 8,
            access_validation: AccessValidation::Eager,
            log_ring_bytes: 1024 * 1024,
            log_level: LevelFilter::Info,
            audit: true,
        }
    }
}

/// Errors from loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl KernelConfig {
    /// Parses and validates a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.universe_capacity == 0 {
            return Err(ConfigError::Invalid(
                "universe_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_chain_depth == 0 || self.max_chain_depth > MAX_NESTING_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "max_chain_depth must be between 1 and {}",
                MAX_NESTING_DEPTH
            )));
        }
        if self.log_ring_bytes == 0 {
            return Err(ConfigError::Invalid(
                "log_ring_bytes must be at least 1".to_string(),
            ));
        }
        if self.max_inline_bytes > INLINE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_inline_bytes {} exceeds the limit of {}",
                self.max_inline_bytes, INLINE_LIMIT
            )));
        }
        Ok(())
    }

    pub fn with_universe_capacity(mut self, capacity: usize) -> Self {
        self.universe_capacity = capacity;
        self
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    pub fn with_max_inline_bytes(mut self, max: usize) -> Self {
        self.max_inline_bytes = max;
        self
    }

    pub fn with_access_validation(mut self, validation: AccessValidation) -> Self {
        self.access_validation = validation;
        self
    }

    pub fn with_log_ring_bytes(mut self, bytes: usize) -> Self {
        self.log_ring_bytes = bytes;
        self
    }

    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.access_validation, AccessValidation::Eager);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            KernelConfig::from_json(r#"{ "universe_capacity": 8, "access_validation": "Deferred" }"#)
                .unwrap();
        assert_eq!(config.universe_capacity, 8);
        assert_eq!(config.access_validation, AccessValidation::Deferred);
        assert_eq!(config.max_inline_bytes, KernelConfig::default().max_inline_bytes);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = KernelConfig::default()
            .with_universe_capacity(16)
            .with_audit(false);
        let json = config.to_json().unwrap();
        assert_eq!(KernelConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = KernelConfig::from_json(r#"{ "universe_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = KernelConfig::default()
            .with_max_inline_bytes(INLINE_LIMIT + 1)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_inline_bytes"));

        let err = KernelConfig::default()
            .with_max_chain_depth(MAX_NESTING_DEPTH + 1)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_chain_depth"));
    }

    #[test]
    fn test_parse_error() {
        let err = KernelConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_inline_bytes": 128, "log_level": "DEBUG" }}"#).unwrap();
        let config = KernelConfig::load(file.path()).unwrap();
        assert_eq!(config.max_inline_bytes, 128);
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = KernelConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
