/// Point-in-time heap counters.
///
/// `max_size` is the highest `current_size` observed since the stats were
/// zeroed and never falls below it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapInfo {
    pub current_size: usize,
    pub max_size: usize,
}

/// Aggregate tracked-byte counters, mutated in the same critical section
/// as the registry so readers never see the two diverge.
#[derive(Debug, Default)]
pub(crate) struct HeapStats {
    current_size: usize,
    max_size: usize,
}

impl HeapStats {
    pub(crate) fn grow(&mut self, bytes: usize) {
        self.current_size += bytes;
        if self.current_size > self.max_size {
            self.max_size = self.current_size;
        }
    }

    pub(crate) fn shrink(&mut self, bytes: usize) {
        self.current_size = self.current_size.saturating_sub(bytes);
    }

    pub(crate) fn snapshot(&self) -> HeapInfo {
        HeapInfo {
            current_size: self.current_size,
            max_size: self.max_size,
        }
    }
}
