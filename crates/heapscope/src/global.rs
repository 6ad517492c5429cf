use std::io::Write;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use tracing::{debug, warn};

use crate::api::HeapAllocator;
use crate::error::{HeapError, Result};
use crate::registry::AllocationRecord;
use crate::report::Format;
use crate::site::CallSite;
use crate::stats::HeapInfo;

cfg_if::cfg_if! {
    if #[cfg(feature = "untracked")] {
        use crate::passthrough::PassthroughHeap;

        type ProcessHeap = PassthroughHeap;

        fn build_heap(format: Format) -> ProcessHeap {
            PassthroughHeap::new().format(format)
        }
    } else {
        use crate::tracked::{HeapBuilder, TrackedHeap};

        type ProcessHeap = TrackedHeap;

        fn build_heap(format: Format) -> ProcessHeap {
            HeapBuilder::new().format(format).build()
        }
    }
}

static PROCESS_HEAP: OnceLock<ArcSwapOption<ProcessHeap>> = OnceLock::new();

fn heap_cell() -> &'static ArcSwapOption<ProcessHeap> {
    PROCESS_HEAP.get_or_init(|| ArcSwapOption::from(None))
}

fn format_from_env() -> Option<Format> {
    match std::env::var("HEAPSCOPE_FORMAT")
        .ok()?
        .to_lowercase()
        .as_str()
    {
        "table" => Some(Format::Table),
        "json" => Some(Format::Json),
        "json-pretty" => Some(Format::JsonPretty),
        other => {
            warn!(message = "unrecognized HEAPSCOPE_FORMAT value", value = other);
            None
        }
    }
}

/// Installs the process-wide heap with default configuration.
///
/// Calls before a matching [`terminate`] fail with
/// [`HeapError::AlreadyInitialized`] - double initialization is a
/// programming error in the host, not something to paper over. The
/// install is atomic, so exactly one of several racing callers wins.
///
/// With the `untracked` feature the installed heap is a
/// [`PassthroughHeap`](crate::PassthroughHeap); callers keep the same
/// contract and lose only the diagnostics.
pub fn initialize() -> Result<()> {
    initialize_with(Format::default())
}

/// Installs the process-wide heap with an explicit report format.
///
/// The `HEAPSCOPE_FORMAT` environment variable (`table` | `json` |
/// `json-pretty`) overrides `format` when set.
pub fn initialize_with(format: Format) -> Result<()> {
    let cell = heap_cell();
    if cell.load().is_some() {
        return Err(HeapError::AlreadyInitialized);
    }

    let format = format_from_env().unwrap_or(format);
    let previous = cell.compare_and_swap(
        std::ptr::null::<ProcessHeap>(),
        Some(Arc::new(build_heap(format))),
    );
    if previous.is_some() {
        // Lost an install race; the winner's heap stays in place.
        return Err(HeapError::AlreadyInitialized);
    }
    debug!(message = "heap tracking initialized");
    Ok(())
}

/// Removes the process-wide heap. Records still present are leaks and get
/// reported as the heap shuts down; the leaked blocks themselves stay
/// allocated. A no-op when nothing is installed.
pub fn terminate() {
    if heap_cell().swap(None).is_some() {
        debug!(message = "heap tracking terminated");
    }
}

/// Allocates through the process-wide heap, recording the caller as the
/// allocation site. Null (with a warning) before [`initialize`].
#[track_caller]
pub fn allocate(size: usize) -> *mut u8 {
    allocate_at(size, CallSite::caller())
}

pub fn allocate_at(size: usize, site: CallSite) -> *mut u8 {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.allocate_at(size, site),
        None => {
            warn!(message = "allocate before initialize", requested = size, requested_at = %site);
            std::ptr::null_mut()
        }
    }
}

/// Resizes a block owned by the process-wide heap. Null (with a warning)
/// before [`initialize`].
///
/// # Safety
///
/// Same contract as [`HeapAllocator::reallocate_at`].
#[track_caller]
pub unsafe fn reallocate(ptr: *mut u8, new_size: usize) -> *mut u8 {
    reallocate_at(ptr, new_size, CallSite::caller())
}

/// # Safety
///
/// Same contract as [`HeapAllocator::reallocate_at`].
pub unsafe fn reallocate_at(ptr: *mut u8, new_size: usize, site: CallSite) -> *mut u8 {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.reallocate_at(ptr, new_size, site),
        None => {
            warn!(
                message = "reallocate before initialize",
                address = ptr as usize,
                requested_at = %site,
            );
            std::ptr::null_mut()
        }
    }
}

/// Frees a block owned by the process-wide heap.
///
/// # Safety
///
/// Same contract as [`HeapAllocator::free_at`].
#[track_caller]
pub unsafe fn free(ptr: *mut u8) -> Result<()> {
    free_at(ptr, CallSite::caller())
}

/// # Safety
///
/// Same contract as [`HeapAllocator::free_at`].
pub unsafe fn free_at(ptr: *mut u8, site: CallSite) -> Result<()> {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.free_at(ptr, site),
        None => Err(HeapError::NotInitialized),
    }
}

/// Stops tracking a block without freeing it, handing its ownership to
/// code outside the tracking domain.
#[track_caller]
pub fn unlink(ptr: *mut u8) -> Result<()> {
    unlink_at(ptr, CallSite::caller())
}

pub fn unlink_at(ptr: *mut u8, site: CallSite) -> Result<()> {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.unlink_at(ptr, site),
        None => Err(HeapError::NotInitialized),
    }
}

/// Looks up the tracking record for `ptr`. None before [`initialize`].
pub fn find(ptr: *mut u8) -> Option<AllocationRecord> {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.find(ptr),
        None => None,
    }
}

/// Snapshot of the process-wide heap counters.
pub fn info() -> Result<HeapInfo> {
    match heap_cell().load().as_ref() {
        Some(heap) => Ok(heap.info()),
        None => Err(HeapError::NotInitialized),
    }
}

/// Writes every live record plus summary totals to `sink`.
pub fn dump(sink: &mut dyn Write) -> Result<()> {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.dump(sink),
        None => Err(HeapError::NotInitialized),
    }
}

/// Writes the single record for `ptr` to `sink`.
pub fn dump_block(sink: &mut dyn Write, ptr: *mut u8) -> Result<()> {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.dump_block(sink, ptr),
        None => Err(HeapError::NotInitialized),
    }
}

/// Writes the consistency check to `sink`, without per-record content.
pub fn scan(sink: &mut dyn Write) -> Result<()> {
    match heap_cell().load().as_ref() {
        Some(heap) => heap.scan(sink),
        None => Err(HeapError::NotInitialized),
    }
}
