//! Compile-time tunables for the allocator.
//!
//! Everything the allocator needs to know at build time lives here, as plain
//! `pub const`s rather than a runtime-parsed file or environment variables —
//! there is no CLI and no persisted state. The rest of the crate depends on
//! these constants as the single source of truth.

/// Log2 of the page size. Pages are the unit of bookkeeping between the
/// central cache and the page cache.
pub const PAGE_SHIFT: usize = 12;

/// Page size in bytes, derived from `PAGE_SHIFT`.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Largest request size served through the size-class system. Anything
/// larger is a "big object" handled directly by the page cache / OS.
pub const MAX_BYTES: usize = 65536;

/// Number of page-count buckets the page cache pools internally
/// (`free_spans[1..NPAGES)`). A span reaching `NPAGES - 1` pages is the
/// largest unit grown from the OS in one call; anything requiring more
/// pages than that bypasses the pool and goes straight to the OS.
pub const NPAGES: usize = 129;
