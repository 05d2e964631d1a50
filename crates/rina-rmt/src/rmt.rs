//! The relaying and multiplexing task.
//!
//! [`Rmt`] ties the forwarding table, the port registry, the queue policy and
//! the egress scheduler together and exposes the two data path entry points:
//!
//! - [`Rmt::send`]: PDUs from the layer above, fanned out over every egress
//!   port the forwarding table returns.
//! - [`Rmt::receive`]: PDUs from an N-1 port, delivered locally or relayed.
//!
//! # Send path
//!
//! ```text
//! send(pdu) ─► validate PCI ─► pff.lookup ─► [p1, p2, .., pn]
//!                                              │   dup   dup   original
//!                                              ▼
//!                       send_to_port(p) ─► policy.enqueue(must_enqueue?)
//!                                              ├─ Send      ─► protect + write now
//!                                              ├─ Scheduled ─► scheduler.schedule()
//!                                              └─ Dropped   ─► counted
//! ```

use crate::config::RmtConfig;
use crate::delivery::LocalDelivery;
use crate::error::{Result, RmtError};
use crate::pdu::Pdu;
use crate::pff::ForwardingTable;
use crate::policy::{DefaultQueuePolicy, EnqueueOutcome, PolicyParams, PolicyRegistry, QueuePolicy};
use crate::ports::{PortHandle, PortRegistry, PortSnapshot};
use crate::scheduler::{EgressScheduler, SchedulerStats, Settled, MAX_PDUS_PER_CYCLE};
use crate::sdup::{LifetimeLimit, NoProtection, SduProtection};
use crate::transport::N1Transport;
use parking_lot::RwLock;
use rina_types::{Address, CepId, PduType, PortId};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happened to a PDU handed to one egress port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOutcome {
    /// Written to the transport; carries the byte count.
    Sent(usize),
    /// Queued for the scheduler.
    Queued,
    /// The transport was full; the PDU waits in the pending slot.
    Pending,
    /// Dropped by the queue policy.
    Dropped,
    /// Lost to a policy, protection or transport error.
    Error,
    /// The port is not bound.
    Unbound,
}

impl PortOutcome {
    /// Returns true if the PDU is on its way (sent, queued or pending).
    pub fn is_accepted(&self) -> bool {
        matches!(self, PortOutcome::Sent(_) | PortOutcome::Queued | PortOutcome::Pending)
    }
}

/// Per-port outcomes of a [`Rmt::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub outcomes: Vec<(PortId, PortOutcome)>,
}

impl SendReport {
    /// Returns true if the forwarding table had no entry for the PDU.
    pub fn is_no_route(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of ports that accepted a copy.
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_accepted()).count()
    }
}

/// Why a received PDU was not delivered or relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// PCI failed validation.
    Malformed,
    /// The unprotect hook rejected it.
    Unprotect,
    /// Lifetime ran out while relaying.
    Expired,
    /// The local delivery upcall failed.
    Delivery,
}

/// Result of [`Rmt::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Handed to layer management.
    DeliveredManagement,
    /// Handed to the connection with this CEP id.
    DeliveredData(CepId),
    /// Relayed towards its destination.
    Forwarded(SendReport),
    /// Destroyed.
    Dropped(DropReason),
}

#[derive(Debug, Default)]
struct Counters {
    malformed: AtomicU64,
    no_route: AtomicU64,
    expired: AtomicU64,
    unprotect_failed: AtomicU64,
    delivered_mgmt: AtomicU64,
    delivered_data: AtomicU64,
    delivery_failed: AtomicU64,
    forwarded: AtomicU64,
    unknown_port: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Engine-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RmtCounters {
    pub malformed: u64,
    pub no_route: u64,
    pub expired: u64,
    pub unprotect_failed: u64,
    pub delivered_mgmt: u64,
    pub delivered_data: u64,
    pub delivery_failed: u64,
    pub forwarded: u64,
    pub unknown_port: u64,
    pub scheduler: SchedulerStats,
}

/// Builder for [`Rmt`].
pub struct RmtBuilder {
    delivery: Arc<dyn LocalDelivery>,
    policy: Option<Arc<dyn QueuePolicy>>,
    sdup: Arc<dyn SduProtection>,
    max_pdus_per_cycle: usize,
    addresses: Vec<Address>,
}

impl RmtBuilder {
    /// Queue policy; defaults to [`DefaultQueuePolicy`].
    pub fn with_policy(mut self, policy: Arc<dyn QueuePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// SDU protection hooks; defaults to [`NoProtection`].
    pub fn with_protection(mut self, sdup: Arc<dyn SduProtection>) -> Self {
        self.sdup = sdup;
        self
    }

    /// Per-port batch bound of the scheduler.
    pub fn with_max_pdus_per_cycle(mut self, max: usize) -> Self {
        self.max_pdus_per_cycle = max;
        self
    }

    /// Adds an address of this IPC process.
    pub fn with_address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    pub fn build(self) -> Rmt {
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(DefaultQueuePolicy::default()));
        let ports = Arc::new(PortRegistry::new());
        let scheduler = Arc::new(
            EgressScheduler::new(Arc::clone(&ports), Arc::clone(&policy), Arc::clone(&self.sdup))
                .with_max_pdus_per_cycle(self.max_pdus_per_cycle),
        );

        let mut addresses = self.addresses;
        addresses.sort();
        addresses.dedup();

        info!(
            policy = policy.name(),
            max_pdus_per_cycle = scheduler.max_pdus_per_cycle(),
            "RMT: created"
        );

        Rmt {
            pff: ForwardingTable::new(),
            ports,
            policy,
            sdup: self.sdup,
            scheduler,
            delivery: self.delivery,
            addresses: RwLock::new(addresses),
            counters: Counters::default(),
        }
    }
}

/// Relaying and multiplexing task of one IPC process.
pub struct Rmt {
    pff: ForwardingTable,
    ports: Arc<PortRegistry>,
    policy: Arc<dyn QueuePolicy>,
    sdup: Arc<dyn SduProtection>,
    scheduler: Arc<EgressScheduler>,
    delivery: Arc<dyn LocalDelivery>,
    addresses: RwLock<Vec<Address>>,
    counters: Counters,
}

impl Rmt {
    /// Starts building an RMT that delivers local PDUs to `delivery`.
    pub fn builder(delivery: Arc<dyn LocalDelivery>) -> RmtBuilder {
        RmtBuilder {
            delivery,
            policy: None,
            sdup: Arc::new(NoProtection),
            max_pdus_per_cycle: MAX_PDUS_PER_CYCLE,
            addresses: Vec::new(),
        }
    }

    /// Builds an RMT from configuration.
    ///
    /// The queue policy is created through `policies`; forwarding entries in
    /// the configuration are installed.
    pub fn from_config(
        config: &RmtConfig,
        policies: &PolicyRegistry,
        delivery: Arc<dyn LocalDelivery>,
    ) -> Result<Self> {
        config.validate()?;

        let policy = policies.create(&config.queue_policy.name, &config.queue_policy.params)?;
        let sdup: Arc<dyn SduProtection> = Arc::new(LifetimeLimit::new(config.lifetime.initial_ttl));

        let mut builder = Rmt::builder(delivery)
            .with_policy(policy)
            .with_protection(sdup)
            .with_max_pdus_per_cycle(config.scheduler.max_pdus_per_cycle);
        for address in &config.addresses {
            builder = builder.with_address(*address);
        }

        let rmt = builder.build();
        if !config.forwarding.is_empty() {
            rmt.pff.modify(&config.forwarding);
        }
        Ok(rmt)
    }

    /// The forwarding table.
    pub fn pff(&self) -> &ForwardingTable {
        &self.pff
    }

    /// The port registry.
    pub fn ports(&self) -> &Arc<PortRegistry> {
        &self.ports
    }

    /// The egress scheduler.
    pub fn scheduler(&self) -> &Arc<EgressScheduler> {
        &self.scheduler
    }

    /// The queue policy in use.
    pub fn policy(&self) -> &Arc<dyn QueuePolicy> {
        &self.policy
    }

    // ---- addresses ----

    /// Adds an address of this IPC process. Adding a known address is a no-op.
    pub fn add_address(&self, address: Address) -> Result<()> {
        if !address.is_valid() {
            return Err(RmtError::Config(format!("invalid address {}", address)));
        }
        let mut addresses = self.addresses.write();
        if !addresses.contains(&address) {
            addresses.push(address);
            addresses.sort();
            info!(address = %address, "RMT: address added");
        }
        Ok(())
    }

    /// Removes an address of this IPC process.
    pub fn remove_address(&self, address: Address) -> Result<()> {
        let mut addresses = self.addresses.write();
        let Some(pos) = addresses.iter().position(|a| *a == address) else {
            return Err(RmtError::AddressNotFound(address));
        };
        addresses.remove(pos);
        info!(address = %address, "RMT: address removed");
        Ok(())
    }

    /// Returns true if `address` names this IPC process.
    pub fn is_local(&self, address: Address) -> bool {
        self.addresses.read().contains(&address)
    }

    /// Addresses of this IPC process, sorted.
    pub fn addresses(&self) -> Vec<Address> {
        self.addresses.read().clone()
    }

    // ---- ports ----

    /// Binds an N-1 port.
    pub fn bind_port(&self, id: PortId, transport: Arc<dyn N1Transport>) -> Result<()> {
        self.ports.bind(id, transport)
    }

    /// Unbinds an N-1 port. Its queues are freed once no one uses it.
    pub fn unbind_port(&self, id: PortId) {
        self.ports.unbind(id);
    }

    /// Enables a port and wakes the scheduler if it has work.
    pub fn enable_port(&self, id: PortId) -> Result<()> {
        if self.ports.enable(id)? {
            self.scheduler.schedule();
        }
        Ok(())
    }

    /// Disables a port.
    pub fn disable_port(&self, id: PortId) -> Result<()> {
        if self.ports.disable(id)? {
            self.scheduler.schedule();
        }
        Ok(())
    }

    /// Statistics of one port.
    pub fn port_stats(&self, id: PortId) -> Option<PortSnapshot> {
        self.ports.snapshot(id)
    }

    /// Statistics of every port.
    pub fn all_port_stats(&self) -> Vec<PortSnapshot> {
        self.ports.snapshots()
    }

    /// Engine-wide counters.
    pub fn counters(&self) -> RmtCounters {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        RmtCounters {
            malformed: load(&c.malformed),
            no_route: load(&c.no_route),
            expired: load(&c.expired),
            unprotect_failed: load(&c.unprotect_failed),
            delivered_mgmt: load(&c.delivered_mgmt),
            delivered_data: load(&c.delivered_data),
            delivery_failed: load(&c.delivery_failed),
            forwarded: load(&c.forwarded),
            unknown_port: load(&c.unknown_port),
            scheduler: self.scheduler.stats(),
        }
    }

    // ---- policy parameters ----

    /// Sets a policy parameter.
    ///
    /// Scopes: `""` or `"rmt"` for the queue policy, `"sdup"` for the
    /// protection hooks. Other scopes, `"pff"` included, have no parameters.
    pub fn set_policy_param(&self, scope: &str, name: &str, value: &str) -> Result<()> {
        let result = match scope {
            "" | "rmt" => self.policy.set_param(name, value),
            "sdup" => self.sdup.set_param(name, value),
            _ => Err(RmtError::UnknownParameter {
                scope: scope.to_string(),
                name: name.to_string(),
            }),
        };
        if let Err(e) = &result {
            warn!(scope, name, value, error = %e, "RMT: policy parameter rejected");
        }
        result
    }

    /// Current parameter values of a scope.
    pub fn policy_params(&self, scope: &str) -> PolicyParams {
        match scope {
            "" | "rmt" => self.policy.params(),
            "sdup" => self.sdup.params(),
            _ => PolicyParams::new(),
        }
    }

    // ---- scheduling ----

    /// Drains all queues on the calling thread until idle.
    pub fn run_until_idle(&self) -> usize {
        self.scheduler.run_until_idle()
    }

    /// Spawns the scheduler worker on the current tokio runtime.
    pub fn spawn_scheduler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.scheduler).run(shutdown))
    }

    /// Unbinds every port and flushes the forwarding table.
    pub fn shutdown(&self) {
        self.pff.flush();
        self.ports.shutdown();
        info!("RMT: shut down");
    }

    // ---- data path ----

    /// Sends a PDU from the layer above.
    ///
    /// One copy goes to every egress port the forwarding table returns: the
    /// first ports get duplicates and the last one gets `pdu` itself. No
    /// route is not an error; the returned report is simply empty.
    pub fn send(&self, pdu: Pdu) -> Result<SendReport> {
        if let Err(e) = pdu.pci.validate() {
            bump(&self.counters.malformed);
            debug!(pdu = pdu.id(), error = %e, "RMT: dropping malformed PDU");
            return Err(e);
        }

        let ports = self.pff.lookup(pdu.pci.dest_address, pdu.pci.qos_id);
        let Some((&last, rest)) = ports.split_last() else {
            bump(&self.counters.no_route);
            warn!(
                dest = %pdu.pci.dest_address,
                qos = %pdu.pci.qos_id,
                "RMT: no next hop, dropping PDU"
            );
            return Ok(SendReport::default());
        };

        let mut report = SendReport {
            outcomes: Vec::with_capacity(ports.len()),
        };
        for &port in rest {
            let copy = pdu.duplicate();
            report.outcomes.push((port, self.transmit(port, copy)));
        }
        report.outcomes.push((last, self.transmit(last, pdu)));
        Ok(report)
    }

    /// Sends a PDU on one port, bypassing the forwarding table.
    pub fn send_to_port(&self, port: PortId, pdu: Pdu) -> Result<PortOutcome> {
        match self.transmit(port, pdu) {
            PortOutcome::Unbound => Err(RmtError::PortNotFound(port)),
            outcome => Ok(outcome),
        }
    }

    fn transmit(&self, id: PortId, pdu: Pdu) -> PortOutcome {
        let Some(port) = self.ports.lookup(id) else {
            bump(&self.counters.unknown_port);
            warn!(port = %id, pdu = pdu.id(), "RMT: egress port not bound, dropping PDU");
            return PortOutcome::Unbound;
        };

        let mut inner = port.lock();
        let must_enqueue = inner.must_enqueue();
        match self.policy.enqueue(id, &mut inner.queues, pdu, must_enqueue) {
            EnqueueOutcome::Scheduled => {
                drop(inner);
                self.scheduler.schedule();
                PortOutcome::Queued
            }
            EnqueueOutcome::Dropped => {
                inner.stats.dropped += 1;
                PortOutcome::Dropped
            }
            EnqueueOutcome::Error => {
                inner.stats.errors += 1;
                PortOutcome::Error
            }
            EnqueueOutcome::Send(pdu) if must_enqueue => {
                error!(
                    port = %id,
                    pdu = pdu.id(),
                    policy = self.policy.name(),
                    "RMT: policy asked to send on a port that must queue, dropping"
                );
                inner.stats.errors += 1;
                PortOutcome::Error
            }
            EnqueueOutcome::Send(pdu) => {
                inner.busy = true;
                drop(inner);
                self.write_direct(&port, pdu)
            }
        }
    }

    /// Direct write for a PDU the policy let through. The caller set `busy`.
    fn write_direct(&self, port: &PortHandle, pdu: Pdu) -> PortOutcome {
        let outcome = self.scheduler.write(port, pdu, true);

        let mut inner = port.lock();
        let settled = self.scheduler.settle(port, &mut inner, outcome);
        inner.busy = false;
        let rearm = inner.state.is_enabled() && inner.queued() > 0;
        drop(inner);

        if rearm {
            self.scheduler.schedule();
        }
        match settled {
            Settled::Sent(bytes) => PortOutcome::Sent(bytes),
            Settled::Blocked => PortOutcome::Pending,
            Settled::Failed => PortOutcome::Error,
        }
    }

    /// Handles a PDU read from N-1 port `ingress`.
    ///
    /// Fails only if `ingress` is not bound; every other outcome, including
    /// drops, is reported in the returned [`ReceiveOutcome`].
    pub fn receive(&self, mut pdu: Pdu, ingress: PortId) -> Result<ReceiveOutcome> {
        let Some(port) = self.ports.lookup(ingress) else {
            bump(&self.counters.unknown_port);
            warn!(port = %ingress, pdu = pdu.id(), "RMT: PDU from unbound port, dropping");
            return Err(RmtError::PortNotFound(ingress));
        };
        port.lock().stats.record_rx(pdu.len());
        let unprotected = self.sdup.unprotect_inbound(ingress, &mut pdu);
        drop(port);

        if let Err(e) = unprotected {
            bump(&self.counters.unprotect_failed);
            warn!(port = %ingress, error = %e, "RMT: unprotect failed, dropping PDU");
            return Ok(ReceiveOutcome::Dropped(DropReason::Unprotect));
        }

        let kind = match pdu.pci.validate() {
            Ok(kind) => kind,
            Err(e) => {
                bump(&self.counters.malformed);
                debug!(port = %ingress, error = %e, "RMT: dropping malformed PDU");
                return Ok(ReceiveOutcome::Dropped(DropReason::Malformed));
            }
        };

        let dest = pdu.pci.dest_address;
        if self.is_local(dest) {
            return Ok(self.deliver_local(kind, pdu, ingress));
        }

        if dest.is_neighbor() {
            return Ok(self.deliver_management(pdu, ingress));
        }

        if !self.sdup.check_lifetime(ingress, &mut pdu) {
            bump(&self.counters.expired);
            debug!(port = %ingress, dest = %dest, "RMT: lifetime expired, dropping PDU");
            return Ok(ReceiveOutcome::Dropped(DropReason::Expired));
        }

        bump(&self.counters.forwarded);
        match self.send(pdu) {
            Ok(report) => Ok(ReceiveOutcome::Forwarded(report)),
            // validated above
            Err(_) => Ok(ReceiveOutcome::Dropped(DropReason::Malformed)),
        }
    }

    fn deliver_local(&self, kind: PduType, pdu: Pdu, ingress: PortId) -> ReceiveOutcome {
        if kind.is_management() {
            return self.deliver_management(pdu, ingress);
        }

        let cep = pdu.pci.dest_cep_id;
        if !cep.is_valid() {
            bump(&self.counters.malformed);
            debug!(port = %ingress, kind = %kind, "RMT: bad destination CEP id, dropping PDU");
            return ReceiveOutcome::Dropped(DropReason::Malformed);
        }

        match self.delivery.deliver_data(cep, pdu) {
            Ok(()) => {
                bump(&self.counters.delivered_data);
                ReceiveOutcome::DeliveredData(cep)
            }
            Err(e) => {
                bump(&self.counters.delivery_failed);
                warn!(cep = %cep, error = %e, "RMT: data delivery failed");
                ReceiveOutcome::Dropped(DropReason::Delivery)
            }
        }
    }

    fn deliver_management(&self, pdu: Pdu, ingress: PortId) -> ReceiveOutcome {
        match self.delivery.deliver_management(ingress, pdu) {
            Ok(()) => {
                bump(&self.counters.delivered_mgmt);
                ReceiveOutcome::DeliveredManagement
            }
            Err(e) => {
                bump(&self.counters.delivery_failed);
                warn!(port = %ingress, error = %e, "RMT: management delivery failed");
                ReceiveOutcome::Dropped(DropReason::Delivery)
            }
        }
    }
}

impl std::fmt::Debug for Rmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rmt")
            .field("policy", &self.policy.name())
            .field("ports", &self.ports.len())
            .field("pff_entries", &self.pff.len())
            .field("addresses", &*self.addresses.read())
            .finish()
    }
}
