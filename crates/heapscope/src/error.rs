use thiserror::Error;

pub type Result<T> = std::result::Result<T, HeapError>;

/// Errors reported by the tracking layer.
///
/// Allocation exhaustion is not represented here - a failed allocate or
/// reallocate surfaces as a null pointer, exactly like the underlying
/// allocator. Errors never abort the operation's caller; the host decides
/// whether to log, ignore or escalate.
#[derive(Error, Debug)]
pub enum HeapError {
    /// A fresh allocation landed on an address that is still tracked.
    #[error("address {address:#x} is already tracked")]
    DuplicateAddress { address: usize },

    /// free, unlink, reallocate or a block report hit a pointer with no
    /// tracking record (double free, foreign pointer, or already unlinked).
    #[error("address {address:#x} is not tracked")]
    UntrackedAddress { address: usize },

    /// initialize was called while the process heap is already installed.
    #[error("heap tracking is already initialized")]
    AlreadyInitialized,

    /// An operation reached the process heap before initialize.
    #[error("heap tracking is not initialized")]
    NotInitialized,

    /// Writing a dump or scan to the caller's sink failed.
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),
}
