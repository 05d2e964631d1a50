//! Relaying and multiplexing task (RMT) of a RINA IPC process.
//!
//! Moves PDUs between the N-1 ports bound below an IPC process and the
//! layers above it:
//!
//! - [`pff`]: forwarding table, (address, QoS) → egress port fan-out set
//! - [`ports`]: N-1 port registry, lifecycle state machine, counted handles
//! - [`policy`]: pluggable per-port queueing policies
//! - [`scheduler`]: egress drain passes with bounded batches and backpressure
//! - [`rmt`]: the send/receive dispatcher tying it all together
//!
//! The lower-layer transport, local delivery, and SDU protection are
//! reached through the [`N1Transport`], [`LocalDelivery`] and
//! [`SduProtection`] traits.

pub mod config;
pub mod delivery;
pub mod error;
pub mod pdu;
pub mod pff;
pub mod policy;
pub mod ports;
pub mod rmt;
pub mod scheduler;
pub mod sdup;
pub mod transport;

pub use config::RmtConfig;
pub use delivery::{LocalDelivery, RecordingDelivery};
pub use error::{Result, RmtError};
pub use pdu::{Pci, Pdu};
pub use pff::{ForwardingEntry, ForwardingTable};
pub use policy::{DefaultQueuePolicy, EnqueueOutcome, PolicyRegistry, QueuePolicy};
pub use ports::{PortRegistry, PortSnapshot, PortState, PortStats};
pub use rmt::{DropReason, PortOutcome, ReceiveOutcome, Rmt, RmtBuilder, RmtCounters, SendReport};
pub use scheduler::EgressScheduler;
pub use sdup::{LifetimeLimit, NoProtection, SduProtection};
pub use transport::{MemoryTransport, N1Transport, TransportError, WriteOutcome};
