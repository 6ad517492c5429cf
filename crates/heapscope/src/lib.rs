//! A heap allocation tracking layer for native client libraries: leak
//! detection, peak/current usage accounting, and reports of live blocks
//! tagged with the file and line that allocated them.
//!
//! Construct a [`TrackedHeap`] (or a [`PassthroughHeap`] when tracking
//! should cost nothing) and route allocations through the
//! [`HeapAllocator`] trait, or install one heap process-wide with
//! [`global::initialize`]. The `untracked` cargo feature switches the
//! process-wide heap to passthrough without changing any caller.

mod api;
mod backing;
mod error;
pub mod global;
mod passthrough;
mod registry;
mod report;
mod site;
mod stats;
mod tracked;

pub use api::HeapAllocator;
pub use backing::{BackingAlloc, Malloc};
pub use error::{HeapError, Result};
pub use passthrough::PassthroughHeap;
pub use registry::AllocationRecord;
pub use report::{format_bytes, Format};
pub use site::CallSite;
pub use stats::HeapInfo;
pub use tracked::{HeapBuilder, TrackedHeap};
