//! Engine configuration
//!
//! Configuration comes from a builder or from a TOML document. Every field
//! has a default, so an empty document is a valid configuration.
//!
//! ## Example Configuration
//!
//! ```toml
//! isolation = "write_after_write"
//! max_commit_attempts = 16
//! max_transient_retries = 5
//! retry_backoff_ms = 2
//!
//! [key_hashing]
//! mode = "fingerprint"
//! bits = 16
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use strand_concurrency::CommitPolicy;
use strand_core::{IsolationLevel, KeyHashing, Result, StrandError};

/// Transaction engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Isolation used by `begin_default`
    pub isolation: IsolationLevel,

    /// How keys are reduced to conflict keys
    pub key_hashing: KeyHashing,

    /// Validate-then-append rounds before a commit gives up on a moving tail
    pub max_commit_attempts: u32,

    /// Transient log failures tolerated per commit
    pub max_transient_retries: u32,

    /// Pause between transient retries, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let policy = CommitPolicy::default();
        Self {
            isolation: IsolationLevel::default(),
            key_hashing: KeyHashing::default(),
            max_commit_attempts: policy.max_commit_attempts,
            max_transient_retries: policy.max_transient_retries,
            retry_backoff_ms: policy.retry_backoff.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    /// Start a builder from the defaults
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents).map_err(|e| StrandError::InvalidConfig {
            message: format!("failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| StrandError::InvalidConfig {
            message: format!("failed to read config file {:?}: {}", path, e),
        })?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| StrandError::InvalidConfig {
            message: format!("failed to serialize config: {}", e),
        })
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<()> {
        self.key_hashing
            .check()
            .map_err(|message| StrandError::InvalidConfig { message })?;
        if self.max_commit_attempts == 0 {
            return Err(StrandError::InvalidConfig {
                message: "max_commit_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Commit loop bounds for the transaction manager
    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            max_commit_attempts: self.max_commit_attempts,
            max_transient_retries: self.max_transient_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Builder for [`EngineConfig`]
///
/// # Example
///
/// ```ignore
/// let config = EngineConfig::builder()
///     .isolation(IsolationLevel::WriteAfterWrite)
///     .fingerprint_bits(16)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Default isolation level
    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.config.isolation = isolation;
        self
    }

    /// Conflict key policy
    pub fn key_hashing(mut self, key_hashing: KeyHashing) -> Self {
        self.config.key_hashing = key_hashing;
        self
    }

    /// Lossy digests of `bits` bits
    pub fn fingerprint_bits(self, bits: u8) -> Self {
        self.key_hashing(KeyHashing::fingerprint(bits))
    }

    /// Compare full keys; no false aborts
    pub fn exact_keys(self) -> Self {
        self.key_hashing(KeyHashing::Exact)
    }

    /// Bound on validate-then-append rounds
    pub fn max_commit_attempts(mut self, attempts: u32) -> Self {
        self.config.max_commit_attempts = attempts;
        self
    }

    /// Bound on transient log failures per commit
    pub fn max_transient_retries(mut self, retries: u32) -> Self {
        self.config.max_transient_retries = retries;
        self
    }

    /// Pause between transient retries
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
