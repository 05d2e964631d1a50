//! PDU and PCI representation used on the RMT data path.
//!
//! A [`Pdu`] is move-only: whoever holds it owns it, and dropping it destroys
//! it. The only way to get a second PDU is [`Pdu::duplicate`], which shares
//! the payload buffer but carries a fresh identity.

use crate::error::{Result, RmtError};
use rina_types::{Address, CepId, PduType, QosId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PDU_ID: AtomicU64 = AtomicU64::new(1);

fn next_pdu_id() -> u64 {
    NEXT_PDU_ID.fetch_add(1, Ordering::Relaxed)
}

/// Protocol control information the RMT inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pci {
    /// Raw PDU type code; see [`PduType`].
    pub pdu_type: u8,
    /// Source IPC process address.
    pub src_address: Address,
    /// Destination IPC process address.
    pub dest_address: Address,
    /// QoS cube of the connection.
    pub qos_id: QosId,
    /// Source connection endpoint.
    pub src_cep_id: CepId,
    /// Destination connection endpoint.
    pub dest_cep_id: CepId,
}

impl Pci {
    /// Creates a PCI with the given type, destination and QoS. CEP ids and
    /// source address start out as the wrong sentinel.
    pub fn new(pdu_type: PduType, dest_address: Address, qos_id: QosId) -> Self {
        Self {
            pdu_type: pdu_type.code(),
            src_address: Address::WRONG,
            dest_address,
            qos_id,
            src_cep_id: CepId::WRONG,
            dest_cep_id: CepId::WRONG,
        }
    }

    /// Sets the source address.
    pub fn with_src_address(mut self, address: Address) -> Self {
        self.src_address = address;
        self
    }

    /// Sets the connection endpoints.
    pub fn with_cep_ids(mut self, src: CepId, dest: CepId) -> Self {
        self.src_cep_id = src;
        self.dest_cep_id = dest;
        self
    }

    /// Decodes the PDU type, if the code is a known one.
    pub fn kind(&self) -> Option<PduType> {
        PduType::try_from(self.pdu_type).ok()
    }

    /// Checks the fields the RMT relies on and returns the decoded type.
    pub fn validate(&self) -> Result<PduType> {
        let kind = PduType::try_from(self.pdu_type)
            .map_err(|e| RmtError::MalformedPdu(e.to_string()))?;

        if !self.dest_address.is_valid() {
            return Err(RmtError::MalformedPdu(
                "invalid destination address".to_string(),
            ));
        }

        if !self.qos_id.is_valid() {
            return Err(RmtError::MalformedPdu("invalid qos id".to_string()));
        }

        Ok(kind)
    }
}

/// A protocol data unit.
pub struct Pdu {
    id: u64,
    /// Header fields.
    pub pci: Pci,
    payload: Arc<[u8]>,
    /// Remaining hop budget, managed by the SDU protection hooks.
    pub lifetime: Option<u8>,
}

impl Pdu {
    /// Creates a PDU from a PCI and payload.
    pub fn new(pci: Pci, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: next_pdu_id(),
            pci,
            payload: payload.into(),
            lifetime: None,
        }
    }

    /// Creates a management PDU for `dest`.
    pub fn management(dest: Address, payload: impl Into<Arc<[u8]>>) -> Self {
        Self::new(Pci::new(PduType::Management, dest, QosId::ANY), payload)
    }

    /// Creates a data PDU for `dest` on the given QoS cube and endpoint.
    pub fn data(
        dest: Address,
        qos_id: QosId,
        dest_cep_id: CepId,
        payload: impl Into<Arc<[u8]>>,
    ) -> Self {
        let pci = Pci::new(PduType::Data, dest, qos_id).with_cep_ids(CepId::WRONG, dest_cep_id);
        Self::new(pci, payload)
    }

    /// Process-unique identity of this PDU.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns true if both PDUs share the same payload buffer.
    pub fn shares_payload(&self, other: &Pdu) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    /// Copies this PDU for multi-port transmission.
    pub fn duplicate(&self) -> Pdu {
        Pdu {
            id: next_pdu_id(),
            pci: self.pci.clone(),
            payload: Arc::clone(&self.payload),
            lifetime: self.lifetime,
        }
    }
}

impl fmt::Debug for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pdu")
            .field("id", &self.id)
            .field("pci", &self.pci)
            .field("len", &self.payload.len())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
