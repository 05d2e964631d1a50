//! PDU Forwarding Function.
//!
//! Maps a (destination address, QoS id) pair to the ordered set of N-1
//! ports a PDU is relayed on.
//!
//! # Architecture
//!
//! ```text
//! add(10, 1, [3])  ──┐
//! add(10, 1, [7])  ──┼──► ForwardingTable ──► lookup(10, 1) = [3, 7]
//! add(20, 0, [9])  ──┘    (RwLock<Vec>)        lookup(20, 5) = [9]   (qos 0 = any)
//! ```
//!
//! `add`, `remove` and `lookup` share one match rule: same address, and a
//! stored QoS id equal to the requested one or 0. When several entries match,
//! the most recently created one wins, so `add(20, 4, ..)` after the wildcard
//! entry above extends that entry instead of creating a new one.
//!
//! The port set of an entry is a fan-out list, not a set of failover
//! alternatives: the dispatcher sends one copy of the PDU on every port.
//! Ports accumulate across `add` calls in insertion order, and an entry whose
//! port set becomes empty is removed.

mod table;
mod types;

pub use table::ForwardingTable;
pub use types::{ForwardingEntry, ForwardingKey};
