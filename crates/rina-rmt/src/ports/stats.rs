//! Per-port statistics.

use super::state::PortState;
use rina_types::PortId;
use serde::{Deserialize, Serialize};

/// Counters kept for each port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortStats {
    /// PDUs waiting in the queues or the pending slot.
    pub queued: u64,
    /// PDUs dropped because the data queue was full.
    pub dropped: u64,
    /// PDUs lost to transmission, protection or policy errors.
    pub errors: u64,
    /// PDUs written to the transport.
    pub tx_pdus: u64,
    /// Bytes written to the transport.
    pub tx_bytes: u64,
    /// PDUs received from the transport.
    pub rx_pdus: u64,
    /// Bytes received from the transport.
    pub rx_bytes: u64,
}

impl PortStats {
    pub(crate) fn record_tx(&mut self, bytes: usize) {
        self.tx_pdus += 1;
        self.tx_bytes += bytes as u64;
    }

    pub(crate) fn record_rx(&mut self, bytes: usize) {
        self.rx_pdus += 1;
        self.rx_bytes += bytes as u64;
    }
}

/// Read-only view of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub port_id: PortId,
    pub state: PortState,
    /// A writer currently owns the port.
    pub busy: bool,
    /// A PDU occupies the pending slot.
    pub has_pending: bool,
    pub stats: PortStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record() {
        let mut stats = PortStats::default();
        stats.record_tx(100);
        stats.record_tx(20);
        stats.record_rx(7);

        assert_eq!(
            stats,
            PortStats {
                tx_pdus: 2,
                tx_bytes: 120,
                rx_pdus: 1,
                rx_bytes: 7,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = PortSnapshot {
            port_id: PortId::new(3),
            state: PortState::Disabled,
            busy: false,
            has_pending: true,
            stats: PortStats::default(),
        };
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["port_id"], 3);
        assert_eq!(json["state"], "disabled");
    }
}
