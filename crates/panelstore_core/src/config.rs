//! Store configuration.

use crate::crypto::EncryptionKey;
use crate::error::{CoreError, CoreResult};
use serde::Serialize;

/// Default Redis URL when none is configured.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/";

/// Default number of keys examined per scan step.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// How `rebuild_indexes` treats index sets that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildMode {
    /// Only add memberships found in current records. Stale memberships
    /// from deleted or changed records are left in place.
    #[default]
    Additive,
    /// Drop every index set of the table first, then re-add. The result
    /// matches the records exactly.
    Exact,
}

/// Configuration for a store handle.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend URL.
    pub redis_url: String,

    /// Field encryption key. `None` disables encryption.
    pub encryption_key: Option<EncryptionKey>,

    /// Keys examined per scan step in full-table reads.
    pub scan_batch_size: usize,

    /// Default mode for index rebuilds.
    pub rebuild_mode: RebuildMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            encryption_key: None,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            rebuild_mode: RebuildMode::Additive,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `REDIS_URL`, `ENCRYPTION_KEY` and `SCAN_BATCH_SIZE` from the
    /// environment, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `ENCRYPTION_KEY` is set but not 32 bytes long,
    /// or if `SCAN_BATCH_SIZE` is not a positive integer.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`StoreConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
            config.redis_url = url;
        }

        if let Some(key) = lookup("ENCRYPTION_KEY").filter(|v| !v.is_empty()) {
            config.encryption_key = Some(EncryptionKey::from_bytes(key.as_bytes())?);
        }

        if let Some(size) = lookup("SCAN_BATCH_SIZE").filter(|v| !v.is_empty()) {
            let parsed: usize = size
                .parse()
                .map_err(|_| CoreError::invalid_config(format!("SCAN_BATCH_SIZE={size}")))?;
            config = config.scan_batch_size(parsed)?;
        }

        Ok(config)
    }

    /// Sets the backend URL.
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Enables field encryption with `key`.
    #[must_use]
    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Sets the scan step size.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero.
    pub fn scan_batch_size(mut self, size: usize) -> CoreResult<Self> {
        if size == 0 {
            return Err(CoreError::invalid_config("scan batch size must be positive"));
        }
        self.scan_batch_size = size;
        Ok(self)
    }

    /// Sets the default rebuild mode.
    #[must_use]
    pub fn rebuild_mode(mut self, mode: RebuildMode) -> Self {
        self.rebuild_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert!(config.encryption_key.is_none());
        assert_eq!(config.scan_batch_size, DEFAULT_SCAN_BATCH_SIZE);
        assert_eq!(config.rebuild_mode, RebuildMode::Additive);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .redis_url("redis://cache:6380/2")
            .rebuild_mode(RebuildMode::Exact)
            .scan_batch_size(7)
            .unwrap();

        assert_eq!(config.redis_url, "redis://cache:6380/2");
        assert_eq!(config.rebuild_mode, RebuildMode::Exact);
        assert_eq!(config.scan_batch_size, 7);
    }

    #[test]
    fn zero_batch_size_rejected() {
        assert!(StoreConfig::new().scan_batch_size(0).is_err());
    }

    #[test]
    fn from_lookup_reads_variables() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("REDIS_URL", "redis://db:6379/"),
            ("ENCRYPTION_KEY", "0123456789abcdef0123456789abcdef"),
            ("SCAN_BATCH_SIZE", "25"),
        ]))
        .unwrap();

        assert_eq!(config.redis_url, "redis://db:6379/");
        assert!(config.encryption_key.is_some());
        assert_eq!(config.scan_batch_size, 25);
    }

    #[test]
    fn short_key_is_fatal() {
        let err = StoreConfig::from_lookup(lookup(&[("ENCRYPTION_KEY", "too-short")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn empty_variables_fall_back() {
        let config =
            StoreConfig::from_lookup(lookup(&[("ENCRYPTION_KEY", ""), ("REDIS_URL", "")])).unwrap();
        assert!(config.encryption_key.is_none());
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
    }

    #[test]
    fn bad_batch_size_is_reported() {
        let err = StoreConfig::from_lookup(lookup(&[("SCAN_BATCH_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }
}
