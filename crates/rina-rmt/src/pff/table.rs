//! Forwarding table storage and operations.

use super::types::{ForwardingEntry, ForwardingKey};
use crate::error::{Result, RmtError};
use parking_lot::RwLock;
use rina_types::{Address, PortId, QosId};
use tracing::{debug, info, warn};

type Entries = Vec<(ForwardingKey, Vec<PortId>)>;

/// The PDU forwarding table.
///
/// Entries are kept in creation order and searched newest first. All
/// operations take the internal lock for the duration of a single update;
/// [`lookup`](Self::lookup) copies the port list out before the lock is
/// released.
#[derive(Debug, Default)]
pub struct ForwardingTable {
    entries: RwLock<Entries>,
}

/// Index of the entry covering `(address, qos_id)`.
fn find(entries: &Entries, address: Address, qos_id: QosId) -> Option<usize> {
    entries.iter().rposition(|(key, _)| key.matches(address, qos_id))
}

impl ForwardingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds ports to the entry covering `(address, qos_id)`, creating an
    /// entry under that exact key if none matches.
    ///
    /// Ports already present are skipped, so repeating an `add` is harmless.
    pub fn add(&self, address: Address, qos_id: QosId, ports: &[PortId]) -> Result<()> {
        let entry = ForwardingEntry::new(address, qos_id, ports.to_vec());
        entry.validate()?;

        let mut entries = self.entries.write();
        Self::add_locked(&mut entries, &entry);
        Ok(())
    }

    fn add_locked(entries: &mut Entries, entry: &ForwardingEntry) {
        if entry.ports.is_empty() {
            return;
        }

        let idx = match find(entries, entry.address, entry.qos_id) {
            Some(idx) => idx,
            None => {
                entries.push((entry.key(), Vec::new()));
                entries.len() - 1
            }
        };
        let (key, set) = &mut entries[idx];
        for port in &entry.ports {
            if !set.contains(port) {
                set.push(*port);
            }
        }
        debug!(key = %key, ports = ?set, "PFF: entry updated");
    }

    /// Removes ports from the entry covering `(address, qos_id)`.
    ///
    /// The entry is deleted once its port set is empty. Ports not in the
    /// entry are ignored. Returns [`RmtError::EntryNotFound`] if no entry
    /// matches; the table is left untouched in that case.
    pub fn remove(&self, address: Address, qos_id: QosId, ports: &[PortId]) -> Result<()> {
        ForwardingKey::new(address, qos_id).validate()?;

        let mut entries = self.entries.write();
        let Some(idx) = find(&entries, address, qos_id) else {
            return Err(RmtError::EntryNotFound { address, qos_id });
        };

        let (key, set) = &mut entries[idx];
        set.retain(|p| !ports.contains(p));
        if set.is_empty() {
            debug!(key = %key, "PFF: entry removed");
            entries.remove(idx);
        }
        Ok(())
    }

    /// Replaces the whole table content.
    ///
    /// Invalid entries are logged and skipped; the others are installed in
    /// order, with the same matching as [`add`](Self::add). Readers never see
    /// a partially rebuilt table. Returns the number of entries installed.
    pub fn modify(&self, new_entries: &[ForwardingEntry]) -> usize {
        let mut entries = self.entries.write();
        entries.clear();

        let mut installed = 0;
        for entry in new_entries {
            if let Err(e) = entry.validate() {
                warn!(error = %e, "PFF: skipping entry during modify");
                continue;
            }
            Self::add_locked(&mut entries, entry);
            installed += 1;
        }

        info!(installed, total = new_entries.len(), "PFF: table replaced");
        installed
    }

    /// Removes all entries.
    pub fn flush(&self) {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        info!(count, "PFF: flushed");
    }

    /// Returns the egress ports for `(address, qos_id)`.
    ///
    /// Returns an empty list when nothing matches.
    pub fn lookup(&self, address: Address, qos_id: QosId) -> Vec<PortId> {
        let entries = self.entries.read();
        find(&entries, address, qos_id)
            .map(|idx| entries[idx].1.clone())
            .unwrap_or_default()
    }

    /// Snapshot of all entries, in creation order.
    pub fn dump(&self) -> Vec<ForwardingEntry> {
        self.entries
            .read()
            .iter()
            .map(|(key, ports)| ForwardingEntry::new(key.address, key.qos_id, ports.clone()))
            .collect()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn a(v: u32) -> Address {
        Address::new(v)
    }

    fn q(v: u16) -> QosId {
        QosId::new(v)
    }

    fn p(v: u32) -> PortId {
        PortId::new(v)
    }

    #[test]
    fn test_add_accumulates_in_order() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(1), &[p(3)]).unwrap();
        pff.add(a(10), q(1), &[p(7)]).unwrap();

        assert_eq!(pff.lookup(a(10), q(1)), vec![p(3), p(7)]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(1), &[p(3), p(7)]).unwrap();
        pff.add(a(10), q(1), &[p(7), p(3)]).unwrap();

        assert_eq!(pff.lookup(a(10), q(1)), vec![p(3), p(7)]);
        assert_eq!(pff.len(), 1);
    }

    #[test]
    fn test_add_rejects_bogus_values() {
        let pff = ForwardingTable::new();
        assert!(pff.add(Address::WRONG, q(1), &[p(1)]).is_err());
        assert!(pff.add(a(1), QosId::WRONG, &[p(1)]).is_err());
        assert!(pff.add(a(1), q(1), &[PortId::WRONG]).is_err());
        assert!(pff.is_empty());
    }

    #[test]
    fn test_add_empty_port_list_creates_nothing() {
        let pff = ForwardingTable::new();
        pff.add(a(1), q(1), &[]).unwrap();
        assert!(pff.is_empty());
    }

    #[test]
    fn test_remove_last_port_removes_entry() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(1), &[p(3), p(7)]).unwrap();

        pff.remove(a(10), q(1), &[p(3)]).unwrap();
        assert_eq!(pff.lookup(a(10), q(1)), vec![p(7)]);

        pff.remove(a(10), q(1), &[p(7)]).unwrap();
        assert!(pff.lookup(a(10), q(1)).is_empty());
        assert!(pff.dump().is_empty());
    }

    #[test]
    fn test_remove_missing_entry_is_not_found() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(1), &[p(3)]).unwrap();

        let err = pff.remove(a(11), q(1), &[p(3)]).unwrap_err();
        assert!(matches!(err, RmtError::EntryNotFound { .. }));
        assert_eq!(pff.len(), 1);
    }

    #[test]
    fn test_remove_unlisted_port_keeps_entry() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(1), &[p(3)]).unwrap();
        pff.remove(a(10), q(1), &[p(9)]).unwrap();
        assert_eq!(pff.lookup(a(10), q(1)), vec![p(3)]);
    }

    #[test]
    fn test_lookup_wildcard_qos() {
        let pff = ForwardingTable::new();
        pff.add(a(10), QosId::ANY, &[p(9)]).unwrap();

        assert_eq!(pff.lookup(a(10), q(5)), vec![p(9)]);
        assert_eq!(pff.lookup(a(10), QosId::ANY), vec![p(9)]);
        assert!(pff.lookup(a(11), q(5)).is_empty());
    }

    #[test]
    fn test_add_extends_wildcard_entry() {
        let pff = ForwardingTable::new();
        pff.add(a(10), QosId::ANY, &[p(9)]).unwrap();
        pff.add(a(10), q(2), &[p(4)]).unwrap();

        assert_eq!(pff.len(), 1);
        assert_eq!(pff.lookup(a(10), q(2)), vec![p(9), p(4)]);
        assert_eq!(pff.lookup(a(10), q(3)), vec![p(9), p(4)]);
        assert_eq!(
            pff.dump(),
            vec![ForwardingEntry::new(a(10), QosId::ANY, vec![p(9), p(4)])]
        );
    }

    #[test]
    fn test_remove_through_wildcard_entry() {
        let pff = ForwardingTable::new();
        pff.add(a(10), QosId::ANY, &[p(9), p(4)]).unwrap();

        pff.remove(a(10), q(5), &[p(9)]).unwrap();
        assert_eq!(pff.lookup(a(10), q(1)), vec![p(4)]);

        pff.remove(a(10), q(7), &[p(4)]).unwrap();
        assert!(pff.is_empty());
    }

    #[test]
    fn test_newest_matching_entry_wins() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(2), &[p(4)]).unwrap();
        // qos 2 entry does not cover qos 0, so a second entry is created
        pff.add(a(10), QosId::ANY, &[p(9)]).unwrap();
        assert_eq!(pff.len(), 2);

        assert_eq!(pff.lookup(a(10), q(2)), vec![p(9)]);
        assert_eq!(pff.lookup(a(10), q(3)), vec![p(9)]);
        assert_eq!(
            pff.dump(),
            vec![
                ForwardingEntry::new(a(10), q(2), vec![p(4)]),
                ForwardingEntry::new(a(10), QosId::ANY, vec![p(9)]),
            ]
        );

        pff.remove(a(10), q(2), &[p(9)]).unwrap();
        assert_eq!(pff.lookup(a(10), q(2)), vec![p(4)]);
        assert!(pff.lookup(a(10), q(3)).is_empty());
    }

    #[test]
    fn test_exact_entry_does_not_cover_other_qos() {
        let pff = ForwardingTable::new();
        pff.add(a(10), q(2), &[p(4)]).unwrap();

        assert!(pff.lookup(a(10), q(3)).is_empty());
        assert!(matches!(
            pff.remove(a(10), q(3), &[p(4)]),
            Err(RmtError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_flush() {
        let pff = ForwardingTable::new();
        pff.add(a(1), q(1), &[p(1)]).unwrap();
        pff.add(a(2), q(0), &[p(2)]).unwrap();

        pff.flush();
        assert!(pff.dump().is_empty());
        assert!(pff.is_empty());
    }

    #[test]
    fn test_modify_replaces_and_skips_invalid() {
        let pff = ForwardingTable::new();
        pff.add(a(1), q(1), &[p(1)]).unwrap();

        let installed = pff.modify(&[
            ForwardingEntry::new(a(2), q(1), vec![p(4), p(5)]),
            ForwardingEntry::new(Address::WRONG, q(1), vec![p(6)]),
            ForwardingEntry::new(a(3), q(0), vec![p(6)]),
        ]);

        assert_eq!(installed, 2);
        assert!(pff.lookup(a(1), q(1)).is_empty());
        assert_eq!(
            pff.dump(),
            vec![
                ForwardingEntry::new(a(2), q(1), vec![p(4), p(5)]),
                ForwardingEntry::new(a(3), q(0), vec![p(6)]),
            ]
        );
    }

    #[test]
    fn test_dump_feeds_modify() {
        let pff = ForwardingTable::new();
        pff.add(a(1), q(1), &[p(1), p(2)]).unwrap();
        pff.add(a(2), q(0), &[p(3)]).unwrap();
        let snapshot = pff.dump();

        let other = ForwardingTable::new();
        other.modify(&snapshot);
        assert_eq!(other.dump(), snapshot);
    }
}
