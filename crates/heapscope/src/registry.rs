use std::collections::btree_map::{BTreeMap, Entry};

use crate::error::{HeapError, Result};
use crate::site::CallSite;

/// Bookkeeping entry for one live tracked block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationRecord {
    pub address: usize,
    pub size: usize,
    pub site: CallSite,
}

/// Live tracked blocks keyed by address.
///
/// A balanced ordered map keeps insert/find/remove logarithmic whatever
/// the address pattern, and reports walk the records in address order.
#[derive(Debug, Default)]
pub(crate) struct AllocationRegistry {
    records: BTreeMap<usize, AllocationRecord>,
}

impl AllocationRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a record for a freshly allocated block. Live addresses are
    /// unique, so an occupied slot means the tracked picture has diverged
    /// from the underlying allocator.
    pub(crate) fn insert(&mut self, record: AllocationRecord) -> Result<()> {
        match self.records.entry(record.address) {
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
            Entry::Occupied(_) => Err(HeapError::DuplicateAddress {
                address: record.address,
            }),
        }
    }

    /// Adds a record unconditionally, returning the stale one it displaced.
    pub(crate) fn replace(&mut self, record: AllocationRecord) -> Option<AllocationRecord> {
        self.records.insert(record.address, record)
    }

    pub(crate) fn find(&self, address: usize) -> Option<&AllocationRecord> {
        self.records.get(&address)
    }

    pub(crate) fn remove(&mut self, address: usize) -> Result<AllocationRecord> {
        self.records
            .remove(&address)
            .ok_or(HeapError::UntrackedAddress { address })
    }

    /// Visits every record in ascending address order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.records.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: usize, size: usize) -> AllocationRecord {
        AllocationRecord {
            address,
            size,
            site: CallSite::new("a.c", 10),
        }
    }

    #[test]
    fn test_insert_find_remove() {
        let mut registry = AllocationRegistry::new();
        registry.insert(record(0x1000, 100)).unwrap();

        let found = registry.find(0x1000).unwrap();
        assert_eq!(found.size, 100);
        assert_eq!(found.site, CallSite::new("a.c", 10));
        assert!(registry.find(0x2000).is_none());

        let removed = registry.remove(0x1000).unwrap();
        assert_eq!(removed.size, 100);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insert_rejects_live_address() {
        let mut registry = AllocationRegistry::new();
        registry.insert(record(0x1000, 100)).unwrap();

        let err = registry.insert(record(0x1000, 200)).unwrap_err();
        assert!(matches!(
            err,
            HeapError::DuplicateAddress { address: 0x1000 }
        ));
        // Original record survives a rejected insert.
        assert_eq!(registry.find(0x1000).unwrap().size, 100);
    }

    #[test]
    fn test_replace_returns_stale_record() {
        let mut registry = AllocationRegistry::new();
        registry.insert(record(0x1000, 100)).unwrap();

        let stale = registry.replace(record(0x1000, 200)).unwrap();
        assert_eq!(stale.size, 100);
        assert_eq!(registry.find(0x1000).unwrap().size, 200);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_missing_address() {
        let mut registry = AllocationRegistry::new();
        let err = registry.remove(0x1000).unwrap_err();
        assert!(matches!(
            err,
            HeapError::UntrackedAddress { address: 0x1000 }
        ));
    }

    #[test]
    fn test_iter_is_address_ordered() {
        let mut registry = AllocationRegistry::new();
        for address in [0x3000, 0x1000, 0x2000] {
            registry.insert(record(address, 8)).unwrap();
        }

        let addresses: Vec<usize> = registry.iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![0x1000, 0x2000, 0x3000]);

        // Traversal restarts from the top every time.
        let again: Vec<usize> = registry.iter().map(|r| r.address).collect();
        assert_eq!(again, addresses);
    }
}
