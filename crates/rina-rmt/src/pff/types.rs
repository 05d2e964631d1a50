//! Forwarding entry types.

use crate::error::{Result, RmtError};
use rina_types::{Address, PortId, QosId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a forwarding entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForwardingKey {
    /// Destination address.
    pub address: Address,
    /// QoS id; [`QosId::ANY`] matches every QoS.
    pub qos_id: QosId,
}

impl ForwardingKey {
    /// Creates a new forwarding key.
    pub fn new(address: Address, qos_id: QosId) -> Self {
        Self { address, qos_id }
    }

    /// Returns true if this key carries the wildcard QoS id.
    pub fn is_wildcard(&self) -> bool {
        self.qos_id.is_any()
    }

    /// Returns true if a PDU for `(address, qos_id)` is covered by this key.
    pub fn matches(&self, address: Address, qos_id: QosId) -> bool {
        self.address == address && (self.is_wildcard() || self.qos_id == qos_id)
    }

    /// Rejects keys carrying a wrong sentinel.
    pub fn validate(&self) -> Result<()> {
        if !self.address.is_valid() {
            return Err(RmtError::InvalidEntry(format!(
                "bogus destination address {}",
                self.address
            )));
        }
        if !self.qos_id.is_valid() {
            return Err(RmtError::InvalidEntry(format!("bogus qos id {}", self.qos_id)));
        }
        Ok(())
    }
}

impl fmt::Display for ForwardingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.qos_id)
    }
}

/// A forwarding entry as installed, dumped, or loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingEntry {
    /// Destination address.
    pub address: Address,
    /// QoS id (0 = any).
    #[serde(default = "default_qos")]
    pub qos_id: QosId,
    /// Egress ports in insertion order.
    pub ports: Vec<PortId>,
}

fn default_qos() -> QosId {
    QosId::ANY
}

impl ForwardingEntry {
    /// Creates a new forwarding entry.
    pub fn new(address: Address, qos_id: QosId, ports: Vec<PortId>) -> Self {
        Self {
            address,
            qos_id,
            ports,
        }
    }

    /// Returns the key of this entry.
    pub fn key(&self) -> ForwardingKey {
        ForwardingKey::new(self.address, self.qos_id)
    }

    /// Validates the key and every port id.
    pub fn validate(&self) -> Result<()> {
        self.key().validate()?;
        if let Some(bad) = self.ports.iter().find(|p| !p.is_valid()) {
            return Err(RmtError::InvalidEntry(format!("bogus port id {}", bad)));
        }
        Ok(())
    }
}
