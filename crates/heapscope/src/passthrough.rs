use std::io::Write;

use crate::api::HeapAllocator;
use crate::backing::{BackingAlloc, Malloc};
use crate::error::{HeapError, Result};
use crate::registry::AllocationRecord;
use crate::report::{self, Format, HeapSnapshot, TrackingMode};
use crate::site::CallSite;
use crate::stats::HeapInfo;

/// Heap with tracking disabled.
///
/// Every call goes straight to the backing allocator with no registry, no
/// counters and no lock. Return values and failure behavior match
/// [`TrackedHeap`](crate::TrackedHeap), so callers cannot tell the modes
/// apart; only the diagnostics go dark. `find` never finds, `info` stays
/// zeroed and `dump`/`scan` write an empty report.
pub struct PassthroughHeap<A: BackingAlloc = Malloc> {
    backing: A,
    format: Format,
}

impl PassthroughHeap<Malloc> {
    pub fn new() -> Self {
        Self {
            backing: Malloc,
            format: Format::default(),
        }
    }
}

impl Default for PassthroughHeap<Malloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: BackingAlloc> PassthroughHeap<A> {
    /// Builds a passthrough heap over `backing` instead of the process C
    /// heap.
    pub fn with_backing(backing: A) -> Self {
        Self {
            backing,
            format: Format::default(),
        }
    }

    /// Sets the output format for dumps and scans.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }
}

impl<A: BackingAlloc> HeapAllocator for PassthroughHeap<A> {
    fn allocate_at(&self, size: usize, _site: CallSite) -> *mut u8 {
        self.backing.alloc(size)
    }

    unsafe fn reallocate_at(&self, ptr: *mut u8, new_size: usize, site: CallSite) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate_at(new_size, site);
        }
        self.backing.realloc(ptr, new_size)
    }

    unsafe fn free_at(&self, ptr: *mut u8, _site: CallSite) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }
        self.backing.free(ptr);
        Ok(())
    }

    fn unlink_at(&self, _ptr: *mut u8, _site: CallSite) -> Result<()> {
        // Nothing is tracked, so there is nothing to detach from.
        Ok(())
    }

    fn find(&self, _ptr: *mut u8) -> Option<AllocationRecord> {
        None
    }

    fn info(&self) -> HeapInfo {
        HeapInfo::default()
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        report::render_dump(
            &HeapSnapshot::empty(TrackingMode::Untracked),
            self.format,
            sink,
        )
    }

    fn dump_block(&self, _sink: &mut dyn Write, ptr: *mut u8) -> Result<()> {
        Err(HeapError::UntrackedAddress {
            address: ptr as usize,
        })
    }

    fn scan(&self, sink: &mut dyn Write) -> Result<()> {
        report::render_scan(
            &HeapSnapshot::empty(TrackingMode::Untracked),
            self.format,
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_passthrough_heap_is_send_sync() {
        is_send_sync::<PassthroughHeap>();
    }

    #[test]
    fn test_allocations_work_without_tracking() {
        let heap = PassthroughHeap::new();
        let ptr = heap.allocate(100);
        assert!(!ptr.is_null());

        assert!(heap.find(ptr).is_none());
        assert_eq!(heap.info(), HeapInfo::default());

        let grown = unsafe { heap.reallocate(ptr, 400) };
        assert!(!grown.is_null());
        unsafe { heap.free(grown).unwrap() };
        assert_eq!(heap.info(), HeapInfo::default());
    }
}
