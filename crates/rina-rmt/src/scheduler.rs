//! Egress scheduler.
//!
//! Drains the queues of enabled ports in bounded batches and owns the
//! non-blocking write path shared with the dispatcher's direct send.
//!
//! # Drain pass
//!
//! ```text
//! for port in registry (id order):
//!     skip if disabled, empty, or another writer holds it (busy ⇒ re-arm)
//!     busy = true
//!     up to max_pdus_per_cycle:
//!         pdu = pending slot  or  policy.dequeue()
//!         write ─► Written      : tx stats, next
//!                  WouldBlock   : pending slot, port disabled, stop
//!                  Failed       : error stats, stop
//!     busy = false
//!     still queued and enabled ⇒ re-arm
//! ```
//!
//! Only one writer owns a port's transport at a time: the `busy` flag is set
//! and cleared under the port lock, and the lock itself is never held across
//! a write.

use crate::pdu::Pdu;
use crate::policy::QueuePolicy;
use crate::ports::{PortHandle, PortInner, PortRegistry};
use crate::sdup::SduProtection;
use crate::transport::WriteOutcome;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

/// Default number of PDUs one port may send in a single pass.
pub const MAX_PDUS_PER_CYCLE: usize = 10;

/// How a write attempt settled on the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    /// Transmitted; carries the byte count.
    Sent(usize),
    /// Parked in the pending slot.
    Blocked,
    /// Lost to a transport or protection error.
    Failed,
}

/// Scheduler counters.
#[derive(Debug, Default)]
struct SchedulerCounters {
    passes: AtomicU64,
    pdus_sent: AtomicU64,
    reschedules: AtomicU64,
}

/// Read-only view of the scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub passes: u64,
    pub pdus_sent: u64,
    pub reschedules: u64,
}

/// Drains port queues on a single deferred-execution context.
pub struct EgressScheduler {
    ports: Arc<PortRegistry>,
    policy: Arc<dyn QueuePolicy>,
    sdup: Arc<dyn SduProtection>,
    max_pdus_per_cycle: usize,
    armed: AtomicBool,
    notify: Notify,
    counters: SchedulerCounters,
}

impl EgressScheduler {
    pub fn new(
        ports: Arc<PortRegistry>,
        policy: Arc<dyn QueuePolicy>,
        sdup: Arc<dyn SduProtection>,
    ) -> Self {
        Self {
            ports,
            policy,
            sdup,
            max_pdus_per_cycle: MAX_PDUS_PER_CYCLE,
            armed: AtomicBool::new(false),
            notify: Notify::new(),
            counters: SchedulerCounters::default(),
        }
    }

    /// Sets the per-port batch bound. Values below 1 are raised to 1.
    pub fn with_max_pdus_per_cycle(mut self, max: usize) -> Self {
        self.max_pdus_per_cycle = max.max(1);
        self
    }

    pub fn max_pdus_per_cycle(&self) -> usize {
        self.max_pdus_per_cycle
    }

    /// Requests a drain pass.
    pub fn schedule(&self) {
        self.armed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Returns true if a pass has been requested and not yet started.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            passes: self.counters.passes.load(Ordering::Relaxed),
            pdus_sent: self.counters.pdus_sent.load(Ordering::Relaxed),
            reschedules: self.counters.reschedules.load(Ordering::Relaxed),
        }
    }

    /// Runs passes until no re-arm is pending. Returns the number of passes.
    pub fn run_until_idle(&self) -> usize {
        let mut passes = 0;
        while self.armed.swap(false, Ordering::AcqRel) {
            self.run_pass();
            passes += 1;
        }
        passes
    }

    /// Worker loop: waits for [`schedule`](Self::schedule) and drains, until
    /// `shutdown` flips to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_pdus_per_cycle = self.max_pdus_per_cycle,
            "EgressScheduler: worker started"
        );
        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    while self.armed.swap(false, Ordering::AcqRel) {
                        self.run_pass();
                        tokio::task::yield_now().await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("EgressScheduler: worker stopped");
    }

    /// One pass over all ports. Returns true if the pass re-armed itself.
    pub fn run_pass(&self) -> bool {
        self.counters.passes.fetch_add(1, Ordering::Relaxed);
        let mut rearm = false;

        for port in self.ports.active_ports() {
            rearm |= self.drain_port(&port);
        }

        if rearm {
            self.schedule();
        }
        rearm
    }

    fn drain_port(&self, port: &PortHandle) -> bool {
        let mut inner = port.lock();
        if !inner.state.is_enabled() || inner.queued() == 0 {
            return false;
        }
        if inner.busy {
            self.counters.reschedules.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        inner.busy = true;

        let mut rearm = false;
        let mut sent = 0;
        while sent < self.max_pdus_per_cycle {
            let (pdu, protect) = match inner.pending.take() {
                Some(pdu) => (pdu, false),
                None => match self.policy.dequeue(port.id(), &mut inner.queues) {
                    Some(pdu) => (pdu, true),
                    None => break,
                },
            };
            drop(inner);

            let outcome = self.write(port, pdu, protect);

            inner = port.lock();
            match self.settle(port, &mut inner, outcome) {
                Settled::Sent(_) => sent += 1,
                Settled::Blocked => {
                    rearm = inner.state.is_enabled();
                    break;
                }
                Settled::Failed => break,
            }
            if inner.state.is_deallocated() {
                break;
            }
        }

        inner.busy = false;
        self.counters.pdus_sent.fetch_add(sent as u64, Ordering::Relaxed);
        if inner.state.is_enabled() && inner.queued() > 0 {
            self.counters.reschedules.fetch_add(1, Ordering::Relaxed);
            rearm = true;
        }
        debug!(port = %port.id(), sent, rearm, "EgressScheduler: port drained");
        rearm
    }

    /// Writes one PDU to the port's transport. Runs without the port lock.
    ///
    /// PDUs coming out of the pending slot were protected on their first
    /// attempt and go out as they are.
    pub(crate) fn write(&self, port: &PortHandle, mut pdu: Pdu, protect: bool) -> WriteOutcome {
        if protect {
            if let Err(e) = self.sdup.protect_outbound(port.id(), &mut pdu) {
                warn!(port = %port.id(), error = %e, "EgressScheduler: protection failed, dropping");
                return WriteOutcome::Failed(crate::transport::TransportError::Write {
                    port: port.id(),
                    reason: e.to_string(),
                });
            }
        }
        port.transport().write(port.id(), pdu)
    }

    /// Applies a write outcome to the port. Called with the port lock held.
    pub(crate) fn settle(
        &self,
        port: &PortHandle,
        inner: &mut PortInner,
        outcome: WriteOutcome,
    ) -> Settled {
        match outcome {
            WriteOutcome::Written(bytes) => {
                inner.stats.record_tx(bytes);
                Settled::Sent(bytes)
            }
            WriteOutcome::WouldBlock(pdu) => {
                if let Some(stale) = inner.pending.replace(pdu) {
                    error!(
                        port = %port.id(),
                        pdu = stale.id(),
                        "EgressScheduler: pending slot already occupied, dropping older PDU"
                    );
                    inner.stats.errors += 1;
                }
                let from = inner.state;
                inner.state = from.on_would_block();
                debug!(port = %port.id(), from = %from, to = %inner.state, "EgressScheduler: write would block");
                Settled::Blocked
            }
            WriteOutcome::Failed(e) => {
                warn!(port = %port.id(), error = %e, "EgressScheduler: write failed");
                inner.stats.errors += 1;
                Settled::Failed
            }
        }
    }
}

impl std::fmt::Debug for EgressScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressScheduler")
            .field("policy", &self.policy.name())
            .field("max_pdus_per_cycle", &self.max_pdus_per_cycle)
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultQueuePolicy;
    use crate::ports::PortState;
    use crate::sdup::{LifetimeLimit, NoProtection};
    use crate::transport::MemoryTransport;
    use pretty_assertions::assert_eq;
    use rina_types::{Address, CepId, PortId, QosId};

    fn p(v: u32) -> PortId {
        PortId::new(v)
    }

    fn data() -> Pdu {
        Pdu::data(Address::new(1), QosId::new(1), CepId::new(1), vec![0u8; 10])
    }

    struct Fixture {
        ports: Arc<PortRegistry>,
        scheduler: EgressScheduler,
    }

    fn fixture() -> Fixture {
        let ports = Arc::new(PortRegistry::new());
        let scheduler = EgressScheduler::new(
            Arc::clone(&ports),
            Arc::new(DefaultQueuePolicy::default()),
            Arc::new(NoProtection),
        );
        Fixture { ports, scheduler }
    }

    fn bind(f: &Fixture, id: u32, transport: &Arc<MemoryTransport>) {
        f.ports.bind(p(id), transport.clone()).unwrap();
    }

    fn queue(f: &Fixture, id: u32, n: usize) -> Vec<u64> {
        let handle = f.ports.lookup(p(id)).unwrap();
        let mut inner = handle.lock();
        (0..n)
            .map(|_| {
                let pdu = data();
                let pid = pdu.id();
                inner.queues.push_data(pdu);
                pid
            })
            .collect()
    }

    #[test]
    fn test_idle_when_not_armed() {
        let f = fixture();
        assert_eq!(f.scheduler.run_until_idle(), 0);
        assert_eq!(f.scheduler.stats().passes, 0);
    }

    #[test]
    fn test_drains_in_fifo_order() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::new());
        bind(&f, 1, &t);
        let ids = queue(&f, 1, 3);

        f.scheduler.schedule();
        f.scheduler.run_until_idle();

        assert_eq!(t.written_ids(), ids);
        let snap = f.ports.snapshot(p(1)).unwrap();
        assert_eq!(snap.stats.tx_pdus, 3);
        assert_eq!(snap.stats.tx_bytes, 30);
        assert_eq!(snap.stats.queued, 0);
        assert!(!snap.busy);
    }

    #[test]
    fn test_batch_bound_rearms() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::new());
        bind(&f, 1, &t);
        queue(&f, 1, 25);

        f.scheduler.schedule();
        assert!(f.scheduler.armed.swap(false, Ordering::AcqRel));
        assert!(f.scheduler.run_pass());
        assert_eq!(t.written_count(), MAX_PDUS_PER_CYCLE);

        let passes = f.scheduler.run_until_idle();
        assert_eq!(passes, 2);
        assert_eq!(t.written_count(), 25);
        assert_eq!(f.scheduler.stats().pdus_sent, 25);
    }

    #[test]
    fn test_fair_share_between_ports() {
        let f = fixture();
        let t1 = Arc::new(MemoryTransport::new());
        let t2 = Arc::new(MemoryTransport::new());
        bind(&f, 1, &t1);
        bind(&f, 2, &t2);
        queue(&f, 1, 30);
        queue(&f, 2, 3);

        f.scheduler.run_pass();
        assert_eq!(t1.written_count(), MAX_PDUS_PER_CYCLE);
        assert_eq!(t2.written_count(), 3);
    }

    #[test]
    fn test_would_block_parks_pdu_and_disables() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::with_capacity(1));
        bind(&f, 1, &t);
        let ids = queue(&f, 1, 3);

        f.scheduler.schedule();
        f.scheduler.run_until_idle();

        assert_eq!(t.written_ids(), vec![ids[0]]);
        let snap = f.ports.snapshot(p(1)).unwrap();
        assert_eq!(snap.state, PortState::Disabled);
        assert!(snap.has_pending);
        assert_eq!(snap.stats.queued, 2);

        t.take_written();
        assert!(f.ports.enable(p(1)).unwrap());
        f.scheduler.schedule();
        f.scheduler.run_until_idle();
        // pending PDU first, then the queue; capacity 1 blocks again
        assert_eq!(t.written_ids(), vec![ids[1]]);

        t.set_capacity(None);
        f.ports.enable(p(1)).unwrap();
        f.scheduler.schedule();
        f.scheduler.run_until_idle();
        assert_eq!(t.written_ids(), vec![ids[1], ids[2]]);
    }

    #[test]
    fn test_would_block_on_do_not_disable_stays_enabled() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::with_capacity(0));
        bind(&f, 1, &t);
        f.ports.enable(p(1)).unwrap();
        queue(&f, 1, 1);

        f.scheduler.schedule();
        f.scheduler.armed.store(false, Ordering::Release);
        assert!(f.scheduler.run_pass());
        assert_eq!(f.ports.snapshot(p(1)).unwrap().state, PortState::Enabled);

        // second refusal disables
        f.scheduler.run_until_idle();
        assert_eq!(f.ports.snapshot(p(1)).unwrap().state, PortState::Disabled);
        assert_eq!(t.would_block_count(), 2);
    }

    #[test]
    fn test_hard_error_counts_and_stops() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::new());
        t.set_failing(true);
        bind(&f, 1, &t);
        queue(&f, 1, 3);

        f.scheduler.run_pass();
        let snap = f.ports.snapshot(p(1)).unwrap();
        assert_eq!(snap.stats.errors, 1);
        assert_eq!(snap.stats.queued, 2);
        assert_eq!(snap.state, PortState::Enabled);
    }

    #[test]
    fn test_skips_disabled_and_busy_ports() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::new());
        bind(&f, 1, &t);
        bind(&f, 2, &t);
        queue(&f, 1, 1);
        queue(&f, 2, 1);
        f.ports.disable(p(1)).unwrap();
        f.ports.lookup(p(2)).unwrap().lock().busy = true;

        assert!(f.scheduler.run_pass());
        assert_eq!(t.written_count(), 0);
        assert_eq!(f.scheduler.stats().reschedules, 1);
    }

    #[test]
    fn test_pending_not_reprotected() {
        let ports = Arc::new(PortRegistry::new());
        let scheduler = EgressScheduler::new(
            Arc::clone(&ports),
            Arc::new(DefaultQueuePolicy::default()),
            Arc::new(LifetimeLimit::new(5)),
        );
        let t = Arc::new(MemoryTransport::new());
        ports.bind(p(1), t.clone()).unwrap();

        let mut pdu = data();
        pdu.lifetime = Some(2);
        ports.lookup(p(1)).unwrap().lock().pending = Some(pdu);
        ports.lookup(p(1)).unwrap().lock().queues.push_data(data());

        scheduler.run_pass();
        let written = t.take_written();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].lifetime, Some(2));
        assert_eq!(written[1].lifetime, Some(5));
    }

    #[tokio::test]
    async fn test_worker_drains_and_stops() {
        let f = fixture();
        let t = Arc::new(MemoryTransport::new());
        bind(&f, 1, &t);
        queue(&f, 1, 4);

        let scheduler = Arc::new(f.scheduler);
        let (tx, rx) = watch::channel(false);
        let worker = tokio::spawn(Arc::clone(&scheduler).run(rx));

        scheduler.schedule();
        for _ in 0..100 {
            if t.written_count() == 4 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(t.written_count(), 4);

        tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
