//! Configuration management for tenantctl
//!
//! Settings are loaded from, in increasing priority:
//! 1. Default values
//! 2. Configuration file (TOML format)
//! 3. Environment variables (`TENANTCTL_*`)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tenantctl_common::QuotaSpec;
use thiserror::Error;

use crate::lifecycle::fanout::{CascadePolicy, FailurePolicy};
use crate::logging::LoggingConfig;

/// Main configuration struct for tenantctl
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantctlConfig {
    /// Cluster connection
    pub cluster: ClusterConfig,
    /// Deletion, readiness and retry budgets
    pub lifecycle: LifecycleConfig,
    /// Defaults applied to new tenant-targets
    pub defaults: DefaultsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Cluster connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Kubeconfig file; the standard discovery chain is used when unset
    pub kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use instead of the current one
    pub context: Option<String>,
    /// Namespace holding tenant identities and their default roles
    pub tenant_namespace: String,
}

/// Lifecycle budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Interval between reads while waiting for a deleted object to go away
    pub deletion_poll_interval_ms: u64,
    /// Give up waiting for a deletion after this long (0 waits forever)
    pub deletion_timeout_secs: u64,
    /// Reads of a new tenant identity before reporting it as not ready
    pub readiness_attempts: u32,
    /// Pause between readiness reads
    pub readiness_interval_ms: u64,
    /// Re-reads allowed when a grant update loses a write race
    pub conflict_retries: u32,
    /// Per-unit deadline for fan-out operations (0 means none)
    pub fanout_deadline_secs: u64,
    /// Failure handling among sibling deletions
    pub leaf_policy: FailurePolicy,
    /// Failure handling for a parent once its children were deleted
    pub parent_policy: FailurePolicy,
}

/// Defaults for new tenant-targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub quota: QuotaSpec,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            tenant_namespace: "default".to_string(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            deletion_poll_interval_ms: 250,
            deletion_timeout_secs: 300,
            readiness_attempts: 600,
            readiness_interval_ms: 1000,
            conflict_retries: 5,
            fanout_deadline_secs: 0,
            leaf_policy: FailurePolicy::BestEffort,
            parent_policy: FailurePolicy::FailFast,
        }
    }
}

impl LifecycleConfig {
    pub fn deletion_poll_interval(&self) -> Duration {
        Duration::from_millis(self.deletion_poll_interval_ms)
    }

    pub fn deletion_timeout(&self) -> Option<Duration> {
        (self.deletion_timeout_secs > 0).then(|| Duration::from_secs(self.deletion_timeout_secs))
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn fanout_deadline(&self) -> Option<Duration> {
        (self.fanout_deadline_secs > 0).then(|| Duration::from_secs(self.fanout_deadline_secs))
    }

    pub fn cascade_policy(&self) -> CascadePolicy {
        CascadePolicy {
            leaf: self.leaf_policy,
            parent: self.parent_policy,
        }
    }
}

impl TenantctlConfig {
    /// Load configuration from the first config file found and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.clone(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Environment variable override
            std::env::var("TENANTCTL_CONFIG").ok().map(PathBuf::from),
            // Standard locations
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config/tenantctl/config.toml")),
            Some(PathBuf::from("./tenantctl.toml")),
        ];

        paths.into_iter().flatten().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Cluster
        if let Ok(path) = std::env::var("TENANTCTL_KUBECONFIG") {
            self.cluster.kubeconfig = Some(PathBuf::from(path));
        }
        if let Ok(context) = std::env::var("TENANTCTL_CONTEXT") {
            self.cluster.context = Some(context);
        }
        if let Ok(namespace) = std::env::var("TENANTCTL_TENANT_NAMESPACE") {
            self.cluster.tenant_namespace = namespace;
        }

        // Lifecycle
        if let Ok(ms) = std::env::var("TENANTCTL_DELETION_POLL_INTERVAL_MS") {
            if let Ok(ms) = ms.parse() {
                self.lifecycle.deletion_poll_interval_ms = ms;
            }
        }
        if let Ok(secs) = std::env::var("TENANTCTL_DELETION_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.lifecycle.deletion_timeout_secs = secs;
            }
        }
        if let Ok(attempts) = std::env::var("TENANTCTL_READINESS_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                self.lifecycle.readiness_attempts = attempts;
            }
        }
        if let Ok(retries) = std::env::var("TENANTCTL_CONFLICT_RETRIES") {
            if let Ok(retries) = retries.parse() {
                self.lifecycle.conflict_retries = retries;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("TENANTCTL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(dir) = std::env::var("TENANTCTL_LOG_DIR") {
            self.logging.file_dir = Some(PathBuf::from(dir));
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lifecycle.deletion_poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Deletion poll interval cannot be 0".to_string(),
            ));
        }

        if self.lifecycle.readiness_attempts == 0 {
            return Err(ConfigError::Validation(
                "Readiness attempts cannot be 0".to_string(),
            ));
        }

        if self.cluster.tenant_namespace.is_empty() {
            return Err(ConfigError::Validation(
                "Tenant namespace cannot be empty".to_string(),
            ));
        }

        self.defaults
            .quota
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file {0:?}: {1}")]
    FileRead(PathBuf, String),
    /// Failed to parse configuration
    #[error("Failed to parse config: {0}")]
    Parse(String),
    /// Configuration validation failed
    #[error("Config validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TenantctlConfig::default();
        assert_eq!(config.cluster.tenant_namespace, "default");
        assert_eq!(config.lifecycle.deletion_poll_interval(), Duration::from_millis(250));
        assert_eq!(config.lifecycle.readiness_attempts, 600);
        assert_eq!(config.defaults.quota.memory, "4Gi");
    }

    #[test]
    fn test_zero_timeouts_mean_unbounded() {
        let mut lifecycle = LifecycleConfig::default();
        assert_eq!(lifecycle.deletion_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(lifecycle.fanout_deadline(), None);

        lifecycle.deletion_timeout_secs = 0;
        assert_eq!(lifecycle.deletion_timeout(), None);
    }

    #[test]
    fn test_default_cascade_policy() {
        let policy = LifecycleConfig::default().cascade_policy();
        assert_eq!(policy.leaf, FailurePolicy::BestEffort);
        assert_eq!(policy.parent, FailurePolicy::FailFast);
    }

    #[test]
    fn test_config_validation() {
        let config = TenantctlConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = TenantctlConfig::default();
        invalid.lifecycle.deletion_poll_interval_ms = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = TenantctlConfig::default();
        invalid.defaults.quota.cpu = "two".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: TenantctlConfig = toml::from_str(
            r#"
            [lifecycle]
            deletion_timeout_secs = 0
            leaf_policy = "fail-fast"
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle.deletion_timeout(), None);
        assert_eq!(config.lifecycle.leaf_policy, FailurePolicy::FailFast);
        assert_eq!(config.lifecycle.conflict_retries, 5);
        assert_eq!(config.cluster.tenant_namespace, "default");
    }

    #[test]
    fn test_generate_sample_config() {
        let sample = TenantctlConfig::generate_sample();
        assert!(sample.contains("[cluster]"));
        assert!(sample.contains("[lifecycle]"));
        assert!(sample.contains("[defaults.quota]"));
        assert!(sample.contains("[logging]"));
    }
}
