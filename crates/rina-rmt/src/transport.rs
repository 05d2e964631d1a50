//! Lower-layer (N-1 flow) transport seam.
//!
//! Writes are non-blocking by contract: a transport that cannot take a PDU
//! right now hands it back in [`WriteOutcome::WouldBlock`] instead of
//! suspending the caller.

use crate::pdu::Pdu;
use parking_lot::Mutex;
use rina_types::PortId;
use thiserror::Error;

/// Hard transport failure. The PDU is gone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The underlying flow is closed.
    #[error("flow on port {0} is closed")]
    Closed(PortId),

    /// Any other write failure.
    #[error("write on port {port} failed: {reason}")]
    Write { port: PortId, reason: String },
}

/// Result of a single non-blocking write.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The PDU was accepted; carries the number of bytes written.
    Written(usize),
    /// The transport is full; the PDU is handed back untouched.
    WouldBlock(Pdu),
    /// The write failed and the PDU was consumed.
    Failed(TransportError),
}

/// Non-blocking writer for an N-1 flow.
pub trait N1Transport: Send + Sync {
    /// Writes one PDU to `port`.
    fn write(&self, port: PortId, pdu: Pdu) -> WriteOutcome;
}

#[derive(Debug, Default)]
struct MemoryState {
    written: Vec<Pdu>,
    capacity: Option<usize>,
    failing: bool,
    closed: bool,
    would_block_count: u64,
}

/// In-memory transport that keeps every PDU written to it.
///
/// With a capacity set, it reports "would block" while that many PDUs are
/// buffered; [`take_written`](Self::take_written) empties the buffer.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    /// Creates an unbounded transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport that buffers at most `capacity` PDUs.
    pub fn with_capacity(capacity: usize) -> Self {
        let transport = Self::default();
        transport.set_capacity(Some(capacity));
        transport
    }

    /// Changes the buffer limit. `None` removes it.
    pub fn set_capacity(&self, capacity: Option<usize>) {
        self.state.lock().capacity = capacity;
    }

    /// Makes every following write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Closes the flow. Every following write fails with
    /// [`TransportError::Closed`].
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Removes and returns the buffered PDUs.
    pub fn take_written(&self) -> Vec<Pdu> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// Identities of the buffered PDUs, in write order.
    pub fn written_ids(&self) -> Vec<u64> {
        self.state.lock().written.iter().map(|p| p.id()).collect()
    }

    /// Number of buffered PDUs.
    pub fn written_count(&self) -> usize {
        self.state.lock().written.len()
    }

    /// Number of writes answered with "would block".
    pub fn would_block_count(&self) -> u64 {
        self.state.lock().would_block_count
    }
}

impl N1Transport for MemoryTransport {
    fn write(&self, port: PortId, pdu: Pdu) -> WriteOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return WriteOutcome::Failed(TransportError::Closed(port));
        }
        if state.failing {
            return WriteOutcome::Failed(TransportError::Write {
                port,
                reason: "transport failing".to_string(),
            });
        }
        if state.capacity.is_some_and(|cap| state.written.len() >= cap) {
            state.would_block_count += 1;
            return WriteOutcome::WouldBlock(pdu);
        }
        let len = pdu.len();
        state.written.push(pdu);
        WriteOutcome::Written(len)
    }
}
