use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::api::HeapAllocator;
use crate::backing::{BackingAlloc, Malloc};
use crate::error::{HeapError, Result};
use crate::registry::{AllocationRecord, AllocationRegistry};
use crate::report::{self, Format, HeapSnapshot, TrackingMode};
use crate::site::CallSite;
use crate::stats::{HeapInfo, HeapStats};

/// Registry and counters guarded as one unit, so lookups and reports
/// never see them diverge.
struct HeapState {
    registry: AllocationRegistry,
    stats: HeapStats,
}

/// Heap that records every live block's address, size and call site.
///
/// Wraps a [`BackingAlloc`] (the process C heap by default) and keeps its
/// bookkeeping behind one lock. The lock spans the backing call plus the
/// bookkeeping for that call, so concurrent operations serialize only on
/// the critical section, never on application work.
pub struct TrackedHeap<A: BackingAlloc = Malloc> {
    backing: A,
    format: Format,
    state: Mutex<HeapState>,
}

/// Builder for a [`TrackedHeap`] with custom configuration.
///
/// # Examples
///
/// ```rust
/// use heapscope::{Format, HeapAllocator, HeapBuilder};
///
/// let heap = HeapBuilder::new().format(Format::Json).build();
/// let ptr = heap.allocate(64);
/// # unsafe { heap.free(ptr).unwrap() };
/// ```
pub struct HeapBuilder<A: BackingAlloc = Malloc> {
    backing: A,
    format: Format,
}

impl HeapBuilder<Malloc> {
    pub fn new() -> Self {
        Self {
            backing: Malloc,
            format: Format::default(),
        }
    }
}

impl Default for HeapBuilder<Malloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: BackingAlloc> HeapBuilder<A> {
    /// Swaps the allocator the heap defers to.
    pub fn backing<B: BackingAlloc>(self, backing: B) -> HeapBuilder<B> {
        HeapBuilder {
            backing,
            format: self.format,
        }
    }

    /// Sets the output format for dumps and scans.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn build(self) -> TrackedHeap<A> {
        TrackedHeap {
            backing: self.backing,
            format: self.format,
            state: Mutex::new(HeapState {
                registry: AllocationRegistry::new(),
                stats: HeapStats::default(),
            }),
        }
    }
}

impl TrackedHeap<Malloc> {
    pub fn new() -> Self {
        HeapBuilder::new().build()
    }
}

impl Default for TrackedHeap<Malloc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: BackingAlloc> TrackedHeap<A> {
    fn state(&self) -> MutexGuard<'_, HeapState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> HeapSnapshot {
        let state = self.state();
        HeapSnapshot::collect(TrackingMode::Tracked, &state.registry, &state.stats)
    }
}

/// Records a fresh block. The backing allocator just returned this
/// address, so a colliding record is stale and gets evicted.
fn track(state: &mut HeapState, record: AllocationRecord) {
    if state.registry.insert(record).is_err() {
        warn!(
            message = "address already tracked, replacing stale record",
            address = record.address,
            allocated_at = %record.site,
        );
        if let Some(stale) = state.registry.replace(record) {
            state.stats.shrink(stale.size);
        }
    }
    state.stats.grow(record.size);
}

impl<A: BackingAlloc> HeapAllocator for TrackedHeap<A> {
    fn allocate_at(&self, size: usize, site: CallSite) -> *mut u8 {
        let mut state = self.state();
        let ptr = self.backing.alloc(size);
        if ptr.is_null() {
            debug!(message = "allocation failed", requested = size, requested_at = %site);
            return ptr;
        }

        track(
            &mut state,
            AllocationRecord {
                address: ptr as usize,
                size,
                site,
            },
        );
        ptr
    }

    unsafe fn reallocate_at(&self, ptr: *mut u8, new_size: usize, site: CallSite) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate_at(new_size, site);
        }

        let mut state = self.state();
        if state.registry.find(ptr as usize).is_none() {
            warn!(
                message = "reallocate of untracked address rejected",
                address = ptr as usize,
                requested_at = %site,
            );
            return std::ptr::null_mut();
        }

        let new_ptr = self.backing.realloc(ptr, new_size);
        if new_ptr.is_null() {
            debug!(message = "reallocation failed", requested = new_size, requested_at = %site);
            return new_ptr;
        }

        if let Ok(old) = state.registry.remove(ptr as usize) {
            state.stats.shrink(old.size);
        }
        track(
            &mut state,
            AllocationRecord {
                address: new_ptr as usize,
                size: new_size,
                site,
            },
        );
        new_ptr
    }

    unsafe fn free_at(&self, ptr: *mut u8, site: CallSite) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }

        let mut state = self.state();
        match state.registry.remove(ptr as usize) {
            Ok(record) => {
                state.stats.shrink(record.size);
                self.backing.free(ptr);
                Ok(())
            }
            Err(err) => {
                // Double free or foreign pointer. Passing it on to the
                // backing allocator is the crash this layer exists to
                // catch, so the block is left alone.
                warn!(
                    message = "free of untracked address",
                    address = ptr as usize,
                    requested_at = %site,
                );
                Err(err)
            }
        }
    }

    fn unlink_at(&self, ptr: *mut u8, site: CallSite) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }

        let mut state = self.state();
        match state.registry.remove(ptr as usize) {
            Ok(record) => {
                state.stats.shrink(record.size);
                Ok(())
            }
            Err(err) => {
                warn!(
                    message = "unlink of untracked address",
                    address = ptr as usize,
                    requested_at = %site,
                );
                Err(err)
            }
        }
    }

    fn find(&self, ptr: *mut u8) -> Option<AllocationRecord> {
        self.state().registry.find(ptr as usize).copied()
    }

    fn info(&self) -> HeapInfo {
        self.state().stats.snapshot()
    }

    fn dump(&self, sink: &mut dyn Write) -> Result<()> {
        let snapshot = self.snapshot();
        report::render_dump(&snapshot, self.format, sink)
    }

    fn dump_block(&self, sink: &mut dyn Write, ptr: *mut u8) -> Result<()> {
        let record = self.find(ptr).ok_or(HeapError::UntrackedAddress {
            address: ptr as usize,
        })?;
        report::render_block(&record, self.format, sink)
    }

    fn scan(&self, sink: &mut dyn Write) -> Result<()> {
        let snapshot = self.snapshot();
        if !snapshot.consistent {
            warn!(
                message = "tracked bytes diverge from current size",
                tracked_bytes = snapshot.tracked_bytes,
                current_size = snapshot.current_size,
            );
        }
        report::render_scan(&snapshot, self.format, sink)
    }
}

impl<A: BackingAlloc> Drop for TrackedHeap<A> {
    fn drop(&mut self) {
        let state = self.state();
        if state.registry.is_empty() {
            return;
        }

        let info = state.stats.snapshot();
        warn!(
            message = "heap tracking stopped with live allocations",
            leaked_blocks = state.registry.len(),
            leaked_bytes = info.current_size,
        );
        for record in state.registry.iter() {
            warn!(
                message = "leaked block",
                address = record.address,
                size = record.size,
                allocated_at = %record.site,
            );
        }
    }
}
