//! Error types for the RMT.

use rina_types::{Address, PortId, QosId};
use thiserror::Error;

/// RMT errors.
#[derive(Error, Debug)]
pub enum RmtError {
    /// Forwarding entry with an invalid key or port list.
    #[error("Invalid forwarding entry: {0}")]
    InvalidEntry(String),

    /// No forwarding entry under the exact key.
    #[error("Forwarding entry not found: address {address}, qos {qos_id}")]
    EntryNotFound { address: Address, qos_id: QosId },

    /// Port id is the wrong sentinel.
    #[error("Invalid port id: {0}")]
    InvalidPortId(PortId),

    /// Port is already bound.
    #[error("Port {0} already bound")]
    PortAlreadyBound(PortId),

    /// Port is not bound (or is being torn down).
    #[error("Port {0} not found")]
    PortNotFound(PortId),

    /// PCI failed validation.
    #[error("Malformed PDU: {0}")]
    MalformedPdu(String),

    /// No queue policy published under that name.
    #[error("Unknown queue policy: {0}")]
    UnknownPolicy(String),

    /// Policy parameter name not recognised.
    #[error("Unknown parameter '{name}' for {scope}")]
    UnknownParameter { scope: String, name: String },

    /// Policy parameter value rejected.
    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParameter { name: String, value: String },

    /// Address is not one of ours.
    #[error("Address {0} not found")]
    AddressNotFound(Address),

    /// SDU protection hook failed.
    #[error("SDU protection error on port {port}: {reason}")]
    Protection { port: PortId, reason: String },

    /// Local delivery upcall failed.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RmtError {
    /// Convenience constructor for protection failures.
    pub fn protection(port: PortId, reason: impl Into<String>) -> Self {
        RmtError::Protection {
            port,
            reason: reason.into(),
        }
    }
}

/// Result type for RMT operations.
pub type Result<T> = std::result::Result<T, RmtError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_display() {
        let err = RmtError::PortAlreadyBound(PortId::new(3));
        assert_eq!(err.to_string(), "Port 3 already bound");

        let err = RmtError::EntryNotFound {
            address: Address::new(10),
            qos_id: QosId::new(1),
        };
        assert_eq!(err.to_string(), "Forwarding entry not found: address 10, qos 1");
    }

    #[test]
    fn test_error_parameter() {
        let err = RmtError::InvalidParameter {
            name: "q_max".to_string(),
            value: "0".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value '0' for parameter 'q_max'");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: RmtError = io.into();
        assert!(matches!(err, RmtError::Io(_)));
    }
}
