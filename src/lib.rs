#![no_std]

//! spancache: a tcmalloc-style thread-caching allocator.
//!
//! Three tiers, fast to slow:
//! - Thread cache (no locks) — per-thread free lists, `std` feature only
//! - Central cache (per-size-class locking) — shared pools carved from spans
//! - Page cache (global lock) — span allocation, coalescing, OS interface
//!
//! # Usage
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: spancache::SpanCache = spancache::SpanCache;
//! ```

#[cfg(any(test, feature = "std"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod allocator;
pub mod central_cache;
pub mod config;
#[cfg(feature = "ffi")]
pub mod ffi;
pub mod page_cache;
pub mod pagemap;
pub mod platform;
pub mod size_class;
pub mod span;
#[cfg(feature = "stats")]
pub mod stats;
pub mod sync;
pub mod thread_cache;

mod macros;

pub use allocator::{concurrent_alloc, concurrent_free, SpanCache};

// Panic handler for freestanding builds (no_std has no default one). Only
// active outside test/std builds, where a host panic handler already exists.
#[cfg(all(feature = "ffi", not(test), not(feature = "std")))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    unsafe extern "C" {
        fn abort() -> !;
    }
    unsafe { abort() }
}
