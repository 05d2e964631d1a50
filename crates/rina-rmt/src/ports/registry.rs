//! Port registry and counted port handles.

use super::port::N1Port;
use super::state::PortState;
use super::stats::PortSnapshot;
use crate::error::{Result, RmtError};
use crate::transport::N1Transport;
use parking_lot::Mutex;
use rina_types::PortId;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct RegistryShared {
    ports: Mutex<HashMap<PortId, Arc<N1Port>>>,
    freed_pdus: AtomicU64,
}

impl RegistryShared {
    /// Unlinks and purges a port whose last reference is gone.
    fn destroy(&self, port: &Arc<N1Port>) {
        {
            let mut ports = self.ports.lock();
            if let Some(current) = ports.get(&port.id()) {
                if Arc::ptr_eq(current, port) {
                    ports.remove(&port.id());
                }
            }
        }

        let freed = port.lock().purge();
        self.freed_pdus.fetch_add(freed as u64, Ordering::Relaxed);
        info!(port = %port.id(), freed, "PortRegistry: port destroyed");
    }
}

/// Counted reference to a live port.
///
/// Dropping the handle releases the reference; if the port was unbound in the
/// meantime and this was the last reference, the port is destroyed.
pub struct PortHandle {
    port: Arc<N1Port>,
    shared: Arc<RegistryShared>,
}

impl PortHandle {
    /// Tries to take a reference on `port`. Fails once the port is unbound.
    fn acquire(port: Arc<N1Port>, shared: Arc<RegistryShared>) -> Option<Self> {
        if !port.lock().acquire() {
            return None;
        }
        Some(Self { port, shared })
    }
}

impl Deref for PortHandle {
    type Target = N1Port;

    fn deref(&self) -> &N1Port {
        &self.port
    }
}

impl Drop for PortHandle {
    fn drop(&mut self) {
        let destroy = self.port.lock().release();
        if destroy {
            self.shared.destroy(&self.port);
        }
    }
}

impl std::fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PortHandle").field(&self.port.id()).finish()
    }
}

/// Registry of bound N-1 ports.
///
/// The registry lock covers only the id → port map; each port has its own
/// lock for state and queues.
#[derive(Debug, Default)]
pub struct PortRegistry {
    shared: Arc<RegistryShared>,
}

impl PortRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a port in the `Enabled` state with no references.
    ///
    /// Fails if the id is the wrong sentinel or is still present, including a
    /// port that is unbound but not yet destroyed.
    pub fn bind(&self, id: PortId, transport: Arc<dyn N1Transport>) -> Result<()> {
        if !id.is_valid() {
            return Err(RmtError::InvalidPortId(id));
        }

        let mut ports = self.shared.ports.lock();
        if ports.contains_key(&id) {
            return Err(RmtError::PortAlreadyBound(id));
        }
        ports.insert(id, Arc::new(N1Port::new(id, transport)));
        info!(port = %id, "PortRegistry: port bound");
        Ok(())
    }

    /// Unbinds a port.
    ///
    /// The port moves to `Deallocated` immediately; it is destroyed when the
    /// last outstanding handle is dropped, which may be right here. Unknown
    /// ports only log a warning.
    pub fn unbind(&self, id: PortId) {
        let Some(handle) = self.lookup(id) else {
            warn!(port = %id, "PortRegistry: unbind of unknown port");
            return;
        };

        handle.lock().state = PortState::Deallocated;
        debug!(port = %id, "PortRegistry: port deallocated");
    }

    /// Applies an enable request.
    ///
    /// Returns true if the port has queued PDUs and the scheduler should run.
    pub fn enable(&self, id: PortId) -> Result<bool> {
        let handle = self.lookup(id).ok_or(RmtError::PortNotFound(id))?;
        let mut inner = handle.lock();
        let from = inner.state;
        inner.state = from.on_enable();
        debug!(port = %id, from = %from, to = %inner.state, "PortRegistry: enable");
        Ok(inner.queued() > 0)
    }

    /// Applies a disable request.
    ///
    /// Returns true if the port stays enabled with queued PDUs and the
    /// scheduler should run.
    pub fn disable(&self, id: PortId) -> Result<bool> {
        let handle = self.lookup(id).ok_or(RmtError::PortNotFound(id))?;
        let mut inner = handle.lock();
        let from = inner.state;
        inner.state = from.on_disable();
        debug!(port = %id, from = %from, to = %inner.state, "PortRegistry: disable");
        Ok(from == PortState::DoNotDisable && inner.queued() > 0)
    }

    /// Returns a counted handle to a port that is bound and not deallocated.
    pub fn lookup(&self, id: PortId) -> Option<PortHandle> {
        let port = self.shared.ports.lock().get(&id).cloned()?;
        PortHandle::acquire(port, Arc::clone(&self.shared))
    }

    /// Releases a handle. Equivalent to dropping it.
    pub fn release(&self, handle: PortHandle) {
        drop(handle);
    }

    /// Handles to every live port, in port id order.
    pub fn active_ports(&self) -> Vec<PortHandle> {
        let mut ports: Vec<Arc<N1Port>> = self.shared.ports.lock().values().cloned().collect();
        ports.sort_by_key(|p| p.id());
        ports
            .into_iter()
            .filter_map(|p| PortHandle::acquire(p, Arc::clone(&self.shared)))
            .collect()
    }

    /// Returns true while the port is linked in the registry, including the
    /// window between unbind and destruction.
    pub fn contains(&self, id: PortId) -> bool {
        self.shared.ports.lock().contains_key(&id)
    }

    /// Number of linked ports.
    pub fn len(&self) -> usize {
        self.shared.ports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.ports.lock().is_empty()
    }

    /// Snapshot of one live port.
    pub fn snapshot(&self, id: PortId) -> Option<PortSnapshot> {
        self.lookup(id).map(|h| h.snapshot())
    }

    /// Snapshots of all live ports, in port id order.
    pub fn snapshots(&self) -> Vec<PortSnapshot> {
        self.active_ports().iter().map(|h| h.snapshot()).collect()
    }

    /// Total PDUs freed by port destruction.
    pub fn freed_pdus(&self) -> u64 {
        self.shared.freed_pdus.load(Ordering::Relaxed)
    }

    /// Unbinds every port.
    pub fn shutdown(&self) {
        let ids: Vec<PortId> = self.shared.ports.lock().keys().copied().collect();
        for id in ids {
            self.unbind(id);
        }
    }
}
