//! Miri backend: raw `mmap`/`VirtualAlloc` FFI is unsupported under Miri, so
//! page allocation is routed through the `alloc` crate's global allocator
//! instead. This keeps the rest of the allocator (spans, size classes,
//! coalescing) runnable under Miri for undefined-behavior detection, at the
//! cost of no longer reserving real OS pages.

use crate::config::PAGE_SIZE;
use alloc::alloc::{Layout, alloc_zeroed, dealloc};

unsafe fn layout_for(size: usize) -> Layout {
    Layout::from_size_align(size, PAGE_SIZE).expect("page_alloc size/align overflow")
}

pub unsafe fn page_alloc(size: usize) -> *mut u8 {
    unsafe { alloc_zeroed(layout_for(size)) }
}

pub unsafe fn page_dealloc(ptr: *mut u8, size: usize) {
    unsafe { dealloc(ptr, layout_for(size)) };
}
