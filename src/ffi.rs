//! C-ABI exports for external linking. Gated behind `features = ["ffi"]`.

use crate::allocator::{concurrent_alloc, concurrent_free};

/// `void* ConcurrentAlloc(size_t size)`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ConcurrentAlloc(size: usize) -> *mut u8 {
    concurrent_alloc(size)
}

/// `void ConcurrentFree(void* ptr)`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ConcurrentFree(ptr: *mut u8) {
    concurrent_free(ptr);
}
