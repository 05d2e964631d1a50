//! Default queueing policy: management first, bounded data FIFO.

use super::{EnqueueOutcome, PolicyParams, QueuePolicy};
use crate::error::{Result, RmtError};
use crate::pdu::Pdu;
use crate::ports::QueueSet;
use rina_types::{PduType, PortId};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Default maximum data queue length.
pub const DEFAULT_Q_MAX: usize = 1000;

/// Name of the only parameter.
const Q_MAX: &str = "q_max";

/// Two-queue policy.
///
/// - Management PDUs go to the management queue, which has no limit.
/// - Everything else goes to the data queue, capped at `q_max`.
/// - A PDU whose queue is empty is sent directly unless the caller says the
///   port is busy.
/// - `dequeue` always empties the management queue first.
#[derive(Debug)]
pub struct DefaultQueuePolicy {
    q_max: AtomicUsize,
}

impl DefaultQueuePolicy {
    /// Registry name.
    pub const NAME: &'static str = "default";

    pub fn new(q_max: usize) -> Self {
        Self {
            q_max: AtomicUsize::new(q_max),
        }
    }

    /// Builds the policy from named parameters.
    pub fn from_params(params: &PolicyParams) -> Result<Self> {
        let policy = Self::new(DEFAULT_Q_MAX);
        if !params.contains_key(Q_MAX) {
            warn!(q_max = DEFAULT_Q_MAX, "DefaultQueuePolicy: no q_max given, using default");
        }
        for (name, value) in params {
            policy.set_param(name, value)?;
        }
        Ok(policy)
    }

    pub fn q_max(&self) -> usize {
        self.q_max.load(Ordering::Relaxed)
    }

    fn parse_q_max(value: &str) -> Result<usize> {
        match value.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(RmtError::InvalidParameter {
                name: Q_MAX.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl Default for DefaultQueuePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_Q_MAX)
    }
}

impl QueuePolicy for DefaultQueuePolicy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn enqueue(
        &self,
        port: PortId,
        queues: &mut QueueSet,
        pdu: Pdu,
        must_enqueue: bool,
    ) -> EnqueueOutcome {
        if pdu.pci.kind() == Some(PduType::Management) {
            if !must_enqueue && queues.mgmt_len() == 0 {
                return EnqueueOutcome::Send(pdu);
            }
            queues.push_mgmt(pdu);
            return EnqueueOutcome::Scheduled;
        }

        if !must_enqueue && queues.data_len() == 0 {
            return EnqueueOutcome::Send(pdu);
        }

        if queues.data_len() >= self.q_max() {
            debug!(port = %port, pdu = pdu.id(), "DefaultQueuePolicy: data queue full, dropping");
            return EnqueueOutcome::Dropped;
        }

        queues.push_data(pdu);
        EnqueueOutcome::Scheduled
    }

    fn dequeue(&self, _port: PortId, queues: &mut QueueSet) -> Option<Pdu> {
        queues.pop_mgmt().or_else(|| queues.pop_data())
    }

    fn set_param(&self, name: &str, value: &str) -> Result<()> {
        if name != Q_MAX {
            warn!(name, value, "DefaultQueuePolicy: unknown parameter");
            return Err(RmtError::UnknownParameter {
                scope: Self::NAME.to_string(),
                name: name.to_string(),
            });
        }

        let q_max = Self::parse_q_max(value)?;
        self.q_max.store(q_max, Ordering::Relaxed);
        info!(q_max, "DefaultQueuePolicy: q_max updated");
        Ok(())
    }

    fn params(&self) -> PolicyParams {
        PolicyParams::from([(Q_MAX.to_string(), self.q_max().to_string())])
    }
}
