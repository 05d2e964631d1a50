//! Configuration file support for the RMT
//!
//! Loads and validates RMT configuration from TOML files.
//! Default location: /etc/rina/rmt.toml

use crate::error::{Result, RmtError};
use crate::pff::ForwardingEntry;
use crate::policy::{PolicyParams, DEFAULT_Q_MAX};
use crate::scheduler::MAX_PDUS_PER_CYCLE;
use crate::sdup::DEFAULT_TTL;
use rina_types::Address;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Default configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rina/rmt.toml";

/// Queue policy selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePolicyConfig {
    /// Name the policy is published under
    #[serde(default = "default_policy_name")]
    pub name: String,

    /// Policy parameters
    #[serde(default = "default_policy_params")]
    pub params: PolicyParams,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// PDUs one port may send per drain pass
    #[serde(default = "default_max_pdus_per_cycle")]
    pub max_pdus_per_cycle: usize,
}

/// Lifetime limit configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeConfig {
    /// Hop budget stamped on outbound PDUs (0 disables)
    #[serde(default = "default_initial_ttl")]
    pub initial_ttl: u8,
}

/// Complete RMT configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RmtConfig {
    /// Addresses of this IPC process
    #[serde(default)]
    pub addresses: Vec<Address>,

    /// Queue policy
    #[serde(default)]
    pub queue_policy: QueuePolicyConfig,

    /// Scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Lifetime limit
    #[serde(default)]
    pub lifetime: LifetimeConfig,

    /// Static forwarding entries
    #[serde(default)]
    pub forwarding: Vec<ForwardingEntry>,
}

// Default functions
fn default_policy_name() -> String {
    "default".to_string()
}

fn default_policy_params() -> PolicyParams {
    PolicyParams::from([("q_max".to_string(), DEFAULT_Q_MAX.to_string())])
}

fn default_max_pdus_per_cycle() -> usize {
    MAX_PDUS_PER_CYCLE
}

fn default_initial_ttl() -> u8 {
    DEFAULT_TTL
}

impl Default for QueuePolicyConfig {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            params: default_policy_params(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_pdus_per_cycle: default_max_pdus_per_cycle(),
        }
    }
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            initial_ttl: default_initial_ttl(),
        }
    }
}

impl RmtConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content).map_err(|e| {
                RmtError::Config(format!("Failed to parse {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "RmtConfig: config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RmtError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RmtError::Config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RmtError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path.as_ref(), content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.queue_policy.name.trim().is_empty() {
            return Err(RmtError::Config("queue_policy.name must not be empty".to_string()));
        }

        if self.scheduler.max_pdus_per_cycle == 0 {
            return Err(RmtError::Config(
                "scheduler.max_pdus_per_cycle must be > 0".to_string(),
            ));
        }

        if let Some(bad) = self.addresses.iter().find(|a| !a.is_valid()) {
            return Err(RmtError::Config(format!("invalid address {}", bad)));
        }

        for entry in &self.forwarding {
            entry
                .validate()
                .map_err(|e| RmtError::Config(format!("forwarding entry {}: {}", entry.key(), e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rina_types::{PortId, QosId};

    #[test]
    fn test_default_config() {
        let config = RmtConfig::default();
        assert_eq!(config.queue_policy.name, "default");
        assert_eq!(config.queue_policy.params.get("q_max").map(String::as_str), Some("1000"));
        assert_eq!(config.scheduler.max_pdus_per_cycle, 10);
        assert_eq!(config.lifetime.initial_ttl, 64);
        assert!(config.addresses.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full() {
        let config = RmtConfig::parse(
            r#"
            addresses = [16]

            [queue_policy]
            name = "default"
            [queue_policy.params]
            q_max = "50"

            [scheduler]
            max_pdus_per_cycle = 4

            [lifetime]
            initial_ttl = 8

            [[forwarding]]
            address = 10
            qos_id = 1
            ports = [3, 7]
            "#,
        )
        .unwrap();

        assert_eq!(config.addresses, vec![Address::new(16)]);
        assert_eq!(config.queue_policy.params.get("q_max").map(String::as_str), Some("50"));
        assert_eq!(config.scheduler.max_pdus_per_cycle, 4);
        assert_eq!(config.lifetime.initial_ttl, 8);
        assert_eq!(
            config.forwarding,
            vec![ForwardingEntry::new(
                Address::new(10),
                QosId::new(1),
                vec![PortId::new(3), PortId::new(7)]
            )]
        );
    }

    #[test]
    fn test_parse_partial_uses_defaults() {
        let config = RmtConfig::parse("addresses = [1, 2]").unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.queue_policy, QueuePolicyConfig::default());
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            RmtConfig::parse("addresses = \"nope\""),
            Err(RmtError::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = RmtConfig::default();
        config.scheduler.max_pdus_per_cycle = 0;
        assert!(config.validate().is_err());

        let mut config = RmtConfig::default();
        config.addresses.push(Address::WRONG);
        assert!(config.validate().is_err());

        let mut config = RmtConfig::default();
        config.forwarding.push(ForwardingEntry::new(
            Address::new(1),
            QosId::WRONG,
            vec![PortId::new(1)],
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rmt.toml");

        let mut config = RmtConfig::default();
        config.addresses.push(Address::new(42));
        config.forwarding.push(ForwardingEntry::new(
            Address::new(5),
            QosId::ANY,
            vec![PortId::new(2)],
        ));
        config.save(&path).unwrap();

        let loaded = RmtConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RmtConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RmtConfig::default());
    }
}
