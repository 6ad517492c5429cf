use std::fmt;
use std::panic::Location;

/// Source location that requested a heap operation.
///
/// Captured automatically by the `#[track_caller]` convenience methods on
/// [`HeapAllocator`](crate::HeapAllocator), or passed explicitly through the
/// `*_at` variants. Attribution only - a site never changes what an
/// operation does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// Captures the location of the nearest caller outside any
    /// `#[track_caller]` chain.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}
