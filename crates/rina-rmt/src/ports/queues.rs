//! Per-port queue storage.

use crate::pdu::Pdu;
use std::collections::VecDeque;

/// The two queues of a port: management drains before data.
///
/// Queue policies decide what goes where; this type only stores.
#[derive(Debug, Default)]
pub struct QueueSet {
    mgmt: VecDeque<Pdu>,
    data: VecDeque<Pdu>,
}

impl QueueSet {
    /// Creates an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the management queue.
    pub fn push_mgmt(&mut self, pdu: Pdu) {
        self.mgmt.push_back(pdu);
    }

    /// Appends to the data queue.
    pub fn push_data(&mut self, pdu: Pdu) {
        self.data.push_back(pdu);
    }

    /// Pops the head of the management queue.
    pub fn pop_mgmt(&mut self) -> Option<Pdu> {
        self.mgmt.pop_front()
    }

    /// Pops the head of the data queue.
    pub fn pop_data(&mut self) -> Option<Pdu> {
        self.data.pop_front()
    }

    pub fn mgmt_len(&self) -> usize {
        self.mgmt.len()
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Total queued PDUs.
    pub fn len(&self) -> usize {
        self.mgmt.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mgmt.is_empty() && self.data.is_empty()
    }

    /// Drops every queued PDU and returns how many there were.
    pub fn clear(&mut self) -> usize {
        let n = self.len();
        self.mgmt.clear();
        self.data.clear();
        n
    }
}
