//! N-1 port object.

use super::queues::QueueSet;
use super::state::PortState;
use super::stats::{PortSnapshot, PortStats};
use crate::pdu::Pdu;
use crate::transport::N1Transport;
use parking_lot::{Mutex, MutexGuard};
use rina_types::PortId;
use std::fmt;
use std::sync::Arc;

/// Mutable port state, guarded by the port lock.
///
/// The lock is held for one state transition or queue operation at a time,
/// never across a transport write. Only the registry, the scheduler and the
/// dispatcher change it; callers outside the crate see [`PortSnapshot`].
#[derive(Debug, Default)]
pub(crate) struct PortInner {
    pub(crate) state: PortState,
    /// A writer (scheduler pass or direct send) owns the transport.
    pub(crate) busy: bool,
    /// PDU that hit "would block" and must go out before anything queued.
    pub(crate) pending: Option<Pdu>,
    pub(crate) queues: QueueSet,
    pub(crate) stats: PortStats,
    refs: u32,
}

impl PortInner {
    /// PDUs waiting on this port, pending slot included.
    pub(crate) fn queued(&self) -> usize {
        self.queues.len() + usize::from(self.pending.is_some())
    }

    /// Returns true if a new PDU has to be queued rather than written
    /// directly, to keep per-port ordering.
    pub(crate) fn must_enqueue(&self) -> bool {
        self.queued() > 0 || self.busy || !self.state.is_enabled()
    }

    pub(crate) fn refs(&self) -> u32 {
        self.refs
    }

    pub(crate) fn acquire(&mut self) -> bool {
        if self.state.is_deallocated() {
            return false;
        }
        self.refs += 1;
        true
    }

    /// Drops one reference. Returns true if the port must now be destroyed.
    pub(crate) fn release(&mut self) -> bool {
        self.refs = self.refs.saturating_sub(1);
        self.refs == 0 && self.state.is_deallocated()
    }

    /// Frees all queued and pending PDUs. Returns the number freed.
    pub(crate) fn purge(&mut self) -> usize {
        let pending = usize::from(self.pending.take().is_some());
        self.queues.clear() + pending
    }
}

/// A port bound below the RMT.
pub struct N1Port {
    id: PortId,
    transport: Arc<dyn N1Transport>,
    inner: Mutex<PortInner>,
}

impl N1Port {
    pub(crate) fn new(id: PortId, transport: Arc<dyn N1Transport>) -> Self {
        Self {
            id,
            transport,
            inner: Mutex::new(PortInner::default()),
        }
    }

    /// Port identifier.
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Transport this port writes to.
    pub fn transport(&self) -> &Arc<dyn N1Transport> {
        &self.transport
    }

    /// Takes the port lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PortInner> {
        self.inner.lock()
    }

    /// Current state, counters and flags.
    pub fn snapshot(&self) -> PortSnapshot {
        let inner = self.inner.lock();
        let mut stats = inner.stats;
        stats.queued = inner.queued() as u64;
        PortSnapshot {
            port_id: self.id,
            state: inner.state,
            busy: inner.busy,
            has_pending: inner.pending.is_some(),
            stats,
        }
    }
}

impl fmt::Debug for N1Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("N1Port").field("id", &self.id).finish()
    }
}
