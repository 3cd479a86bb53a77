use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out process-unique RNG seeds.
///
/// Every pool of particle streams pulls its seeds from one allocator, so two
/// pools built from the same allocator never share a stream, while a fixed
/// base seed keeps whole runs reproducible. Allocation is atomic and may be
/// called concurrently when several samplers are constructed in parallel.
#[derive(Debug)]
pub struct SeedAllocator {
    next: AtomicU64,
}

impl SeedAllocator {
    /// Create an allocator whose first seed is `base + 1`.
    pub fn new(base: u64) -> Self {
        Self {
            next: AtomicU64::new(base),
        }
    }

    /// The next unused seed. Monotonically increasing, never repeated.
    pub fn next_seed(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Skip `steps` seeds, e.g. to leave room for streams allocated elsewhere.
    pub fn skip(&self, steps: u64) {
        self.next.fetch_add(steps, Ordering::Relaxed);
    }
}

impl Default for SeedAllocator {
    fn default() -> Self {
        Self::new(0)
    }
}
