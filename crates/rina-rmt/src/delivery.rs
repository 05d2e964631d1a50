//! Upcalls for PDUs addressed to this IPC process.

use crate::error::Result;
use crate::pdu::Pdu;
use parking_lot::Mutex;
use rina_types::{CepId, PortId};

/// Receiver of locally destined PDUs.
///
/// Management PDUs go to the IPC process (layer management), everything else
/// to the connection identified by the destination CEP id.
pub trait LocalDelivery: Send + Sync {
    /// Delivers a management PDU that arrived on `port`.
    fn deliver_management(&self, port: PortId, pdu: Pdu) -> Result<()>;

    /// Delivers a data or control PDU to connection `cep_id`.
    fn deliver_data(&self, cep_id: CepId, pdu: Pdu) -> Result<()>;
}

/// Delivery sink that records what it receives.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    management: Mutex<Vec<(PortId, Pdu)>>,
    data: Mutex<Vec<(CepId, Pdu)>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the management PDUs received so far.
    pub fn take_management(&self) -> Vec<(PortId, Pdu)> {
        std::mem::take(&mut *self.management.lock())
    }

    /// Removes and returns the data PDUs received so far.
    pub fn take_data(&self) -> Vec<(CepId, Pdu)> {
        std::mem::take(&mut *self.data.lock())
    }

    pub fn management_count(&self) -> usize {
        self.management.lock().len()
    }

    pub fn data_count(&self) -> usize {
        self.data.lock().len()
    }
}

impl LocalDelivery for RecordingDelivery {
    fn deliver_management(&self, port: PortId, pdu: Pdu) -> Result<()> {
        self.management.lock().push((port, pdu));
        Ok(())
    }

    fn deliver_data(&self, cep_id: CepId, pdu: Pdu) -> Result<()> {
        self.data.lock().push((cep_id, pdu));
        Ok(())
    }
}
