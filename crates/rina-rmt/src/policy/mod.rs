//! Pluggable per-port queueing policies.
//!
//! A [`QueuePolicy`] decides, for every PDU handed to a port, whether it can
//! be written right away, must wait in the port's [`QueueSet`], or is
//! dropped; and which PDU leaves the queues next.
//!
//! Policies are created by name through a [`PolicyRegistry`]; `"default"`
//! is always available (see [`DefaultQueuePolicy`]).

mod default;
mod registry;

pub use default::{DefaultQueuePolicy, DEFAULT_Q_MAX};
pub use registry::{PolicyConstructor, PolicyParams, PolicyRegistry};

use crate::error::Result;
use crate::pdu::Pdu;
use crate::ports::QueueSet;
use rina_types::PortId;
use std::fmt;

/// Decision taken by [`QueuePolicy::enqueue`].
pub enum EnqueueOutcome {
    /// Nothing is queued; the caller writes the PDU now.
    Send(Pdu),
    /// The PDU is queued and the scheduler must run.
    Scheduled,
    /// The PDU was destroyed (queue full).
    Dropped,
    /// The policy failed; the PDU was destroyed.
    Error,
}

impl fmt::Debug for EnqueueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueOutcome::Send(pdu) => f.debug_tuple("Send").field(&pdu.id()).finish(),
            EnqueueOutcome::Scheduled => write!(f, "Scheduled"),
            EnqueueOutcome::Dropped => write!(f, "Dropped"),
            EnqueueOutcome::Error => write!(f, "Error"),
        }
    }
}

/// Queueing discipline applied to every port.
///
/// Called with the port lock held; implementations must not block.
pub trait QueuePolicy: Send + Sync {
    /// Name the policy was published under.
    fn name(&self) -> &str;

    /// Places `pdu` for `port`.
    ///
    /// With `must_enqueue` false and nothing queued ahead of the PDU, the
    /// policy should return [`EnqueueOutcome::Send`]. With `must_enqueue`
    /// true it must not.
    fn enqueue(
        &self,
        port: PortId,
        queues: &mut QueueSet,
        pdu: Pdu,
        must_enqueue: bool,
    ) -> EnqueueOutcome;

    /// Next PDU to transmit on `port`.
    fn dequeue(&self, port: PortId, queues: &mut QueueSet) -> Option<Pdu>;

    /// Sets a named parameter.
    fn set_param(&self, name: &str, value: &str) -> Result<()>;

    /// Reads a named parameter.
    fn param(&self, name: &str) -> Option<String> {
        self.params().remove(name)
    }

    /// All parameter values.
    fn params(&self) -> PolicyParams;
}
