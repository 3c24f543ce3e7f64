//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and
//! not used as synchronization primitives. The allocator's own spinlocks
//! provide the ordering guarantees for correctness; these counters are
//! purely for monitoring. Only present when the `stats` feature is on.
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads are
//! each atomic but not globally consistent with each other.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    /// Total calls to `concurrent_alloc` with size > 0.
    pub alloc_count: AtomicU64,
    /// Total calls to `concurrent_free` with a non-null pointer.
    pub dealloc_count: AtomicU64,
    /// Sum of all requested byte sizes.
    pub alloc_bytes: AtomicU64,
    /// Allocations served from the thread cache (fast path, no lock).
    pub thread_cache_hits: AtomicU64,
    /// Allocations that fell through to the central cache or page cache.
    pub thread_cache_misses: AtomicU64,
    /// Calls to `platform::page_alloc`.
    pub os_alloc_count: AtomicU64,
    /// Bytes requested from the OS via `platform::page_alloc`.
    pub os_alloc_bytes: AtomicU64,
    /// Times a span was split (carve_span produced a remainder).
    pub span_splits: AtomicU64,
    /// Times two adjacent free spans were merged.
    pub span_coalesces: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            dealloc_count: AtomicU64::new(0),
            alloc_bytes: AtomicU64::new(0),
            thread_cache_hits: AtomicU64::new(0),
            thread_cache_misses: AtomicU64::new(0),
            os_alloc_count: AtomicU64::new(0),
            os_alloc_bytes: AtomicU64::new(0),
            span_splits: AtomicU64::new(0),
            span_coalesces: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// A point-in-time snapshot of all allocation statistics.
///
/// Fields are plain `u64` values loaded from the global atomic counters.
/// The snapshot as a whole is not globally consistent — concurrent
/// allocations may race between loads. For monitoring purposes this is
/// always sufficient.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub dealloc_count: u64,
    pub alloc_bytes: u64,
    pub thread_cache_hits: u64,
    pub thread_cache_misses: u64,
    pub os_alloc_count: u64,
    pub os_alloc_bytes: u64,
    pub span_splits: u64,
    pub span_coalesces: u64,
}

/// Load all counters with `Relaxed` ordering and return a [`Snapshot`].
pub fn snapshot() -> Snapshot {
    let s = &STATS;
    Snapshot {
        alloc_count: s.alloc_count.load(Ordering::Relaxed),
        dealloc_count: s.dealloc_count.load(Ordering::Relaxed),
        alloc_bytes: s.alloc_bytes.load(Ordering::Relaxed),
        thread_cache_hits: s.thread_cache_hits.load(Ordering::Relaxed),
        thread_cache_misses: s.thread_cache_misses.load(Ordering::Relaxed),
        os_alloc_count: s.os_alloc_count.load(Ordering::Relaxed),
        os_alloc_bytes: s.os_alloc_bytes.load(Ordering::Relaxed),
        span_splits: s.span_splits.load(Ordering::Relaxed),
        span_coalesces: s.span_coalesces.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reads_without_panicking() {
        let snap = snapshot();
        let _ = snap.alloc_count;
    }
}
