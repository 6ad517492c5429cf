use std::io::Write;

use crate::error::Result;
use crate::registry::AllocationRecord;
use crate::site::CallSite;
use crate::stats::HeapInfo;

/// Allocation interface shared by the tracked and passthrough heaps.
///
/// Both implementations return the same values for the same calls -
/// tracking is a side channel, never part of the contract. Hosts pick an
/// implementation at construction ([`TrackedHeap`](crate::TrackedHeap) or
/// [`PassthroughHeap`](crate::PassthroughHeap)) and route call sites
/// through whichever one they hold.
///
/// The `*_at` methods take an explicit [`CallSite`]; the short forms are
/// `#[track_caller]` conveniences that capture the caller's own file and
/// line. Sites feed diagnostics only.
///
/// # Examples
///
/// ```rust
/// use heapscope::{HeapAllocator, TrackedHeap};
///
/// let heap = TrackedHeap::new();
/// let ptr = heap.allocate(128);
/// if !ptr.is_null() {
///     assert_eq!(heap.find(ptr).unwrap().size, 128);
///     unsafe { heap.free(ptr).unwrap() };
/// }
/// assert_eq!(heap.info().current_size, 0);
/// ```
pub trait HeapAllocator: Send + Sync {
    /// Allocates `size` bytes, recording `site` against the block.
    /// Null on failure, in which case nothing is recorded.
    fn allocate_at(&self, size: usize, site: CallSite) -> *mut u8;

    /// Resizes the block at `ptr` to `new_size` bytes, possibly moving it.
    /// A null `ptr` behaves as an allocation. Null on failure, in which
    /// case the original block and its record are untouched.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have come from this heap and not yet been
    /// freed or unlinked.
    unsafe fn reallocate_at(&self, ptr: *mut u8, new_size: usize, site: CallSite) -> *mut u8;

    /// Releases the block at `ptr` and drops its record. A null `ptr` is a
    /// no-op. An untracked `ptr` is reported and left alone - it is never
    /// handed to the underlying allocator.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must have come from this heap and not yet been
    /// freed, or be a pointer this heap never saw (which is reported).
    unsafe fn free_at(&self, ptr: *mut u8, site: CallSite) -> Result<()>;

    /// Drops the record for `ptr` without freeing the block, handing its
    /// ownership to code outside the tracking domain. The block stays
    /// valid for a direct free by the untracked path. A null `ptr` is a
    /// no-op; an untracked `ptr` is reported and no record changes.
    fn unlink_at(&self, ptr: *mut u8, site: CallSite) -> Result<()>;

    /// Looks up the record for `ptr`. Read-only.
    fn find(&self, ptr: *mut u8) -> Option<AllocationRecord>;

    /// Snapshot of the current and peak tracked byte counts. The pair is
    /// copied in one critical section and never observed half-updated.
    fn info(&self) -> HeapInfo;

    /// Writes every live record plus summary totals to `sink`, including
    /// a cross-check of the record sizes against `current_size`.
    fn dump(&self, sink: &mut dyn Write) -> Result<()>;

    /// Writes the single record for `ptr` to `sink`.
    fn dump_block(&self, sink: &mut dyn Write, ptr: *mut u8) -> Result<()>;

    /// Writes only the consistency check to `sink`, without per-record
    /// content.
    fn scan(&self, sink: &mut dyn Write) -> Result<()>;

    #[track_caller]
    fn allocate(&self, size: usize) -> *mut u8 {
        self.allocate_at(size, CallSite::caller())
    }

    /// # Safety
    ///
    /// Same contract as [`reallocate_at`](Self::reallocate_at).
    #[track_caller]
    unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        self.reallocate_at(ptr, new_size, CallSite::caller())
    }

    /// # Safety
    ///
    /// Same contract as [`free_at`](Self::free_at).
    #[track_caller]
    unsafe fn free(&self, ptr: *mut u8) -> Result<()> {
        self.free_at(ptr, CallSite::caller())
    }

    #[track_caller]
    fn unlink(&self, ptr: *mut u8) -> Result<()> {
        self.unlink_at(ptr, CallSite::caller())
    }
}
