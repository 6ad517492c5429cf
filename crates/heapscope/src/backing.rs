use std::ffi::c_void;

/// Malloc-shaped allocator that both heap modes defer to.
///
/// The contract is the C allocator's: `free` and `realloc` take no size,
/// a block's address stays stable and unique while it is live, and a
/// failed `realloc` leaves the original block untouched. Keeping the
/// tracked and passthrough paths on one `BackingAlloc` is what makes
/// [`unlink`](crate::HeapAllocator::unlink) handoffs sound - the untracked
/// side can free a pointer the tracked side allocated.
///
/// # Safety
///
/// Implementations must return null or a pointer valid for `size` bytes
/// from `alloc`, must keep live addresses distinct, and must accept any
/// live pointer they previously returned in `realloc` and `free`.
pub unsafe trait BackingAlloc: Send + Sync + 'static {
    /// Allocates `size` bytes. Null on failure.
    fn alloc(&self, size: usize) -> *mut u8;

    /// Resizes the block at `ptr` to `new_size` bytes, possibly moving it.
    /// Null on failure, in which case the original block is untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not yet freed.
    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> *mut u8;

    /// Releases the block at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not yet freed.
    unsafe fn free(&self, ptr: *mut u8);
}

/// The process C heap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Malloc;

unsafe impl BackingAlloc for Malloc {
    fn alloc(&self, size: usize) -> *mut u8 {
        unsafe { libc::malloc(size) as *mut u8 }
    }

    unsafe fn realloc(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        libc::realloc(ptr as *mut c_void, new_size) as *mut u8
    }

    unsafe fn free(&self, ptr: *mut u8) {
        libc::free(ptr as *mut c_void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malloc_roundtrip() {
        let ptr = Malloc.alloc(64);
        assert!(!ptr.is_null());
        unsafe {
            std::ptr::write_bytes(ptr, 0xab, 64);
            assert_eq!(*ptr, 0xab);

            let grown = Malloc.realloc(ptr, 256);
            assert!(!grown.is_null());
            assert_eq!(*grown, 0xab);
            Malloc.free(grown);
        }
    }
}
