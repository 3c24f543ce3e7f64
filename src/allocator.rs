//! Top-level allocator: ties all tiers together and exposes both a plain
//! function-pair API (`concurrent_alloc`/`concurrent_free`) and a
//! `GlobalAlloc` implementation built on top of it.
//!
//! Static state lives here. `SpanCache` itself is zero-sized; all mutable
//! state is in module-level statics protected by spinlocks or atomics.
//!
//! Thread-local cache strategy:
//! - `std` feature (on by default): `std::thread_local!` holding the
//!   per-thread cache, wrapped in a `Drop`-guarded cell so thread exit
//!   flushes every free list back to the central cache (SPEC §4.1/§5).
//! - without `std` (bare `no_std`, no thread-exit hook available): every
//!   request goes straight to the central cache. Correct, just without the
//!   lock-free fast path.

use crate::central_cache::CentralCache;
use crate::config::{MAX_BYTES, PAGE_SHIFT, PAGE_SIZE};
use crate::page_cache::PageCache;
use crate::pagemap::PageMap;
use crate::size_class;
use crate::span::{self, FreeObject};
use crate::sync::SpinMutex;
use crate::{stat_add, stat_inc};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

pub(crate) static PAGE_MAP: PageMap = PageMap::new();
pub(crate) static PAGE_CACHE: SpinMutex<PageCache> = SpinMutex::new(PageCache::new(&PAGE_MAP));
pub(crate) static CENTRAL_CACHE: CentralCache = CentralCache::new();

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        use crate::thread_cache::ThreadCache;

        /// Wraps the per-thread cache so that `std::thread_local!`'s
        /// destructor drains every free list back to the central cache
        /// before the thread's storage is torn down. Without this, objects
        /// still cached at thread exit would leak and their spans would
        /// never see `use_count` return to zero (SPEC §4.1, §5).
        struct TcCell(core::cell::UnsafeCell<ThreadCache>);

        impl Drop for TcCell {
            fn drop(&mut self) {
                unsafe {
                    (*self.0.get()).flush_and_destroy(&CENTRAL_CACHE, &PAGE_CACHE, &PAGE_MAP);
                }
            }
        }

        std::thread_local! {
            static TC_CELL: TcCell = const {
                TcCell(core::cell::UnsafeCell::new(ThreadCache::new()))
            };
        }
    }
}

/// Allocate `bytes` bytes with default alignment. Returns null on failure.
///
/// Requests up to [`MAX_BYTES`] are served through the size-class system
/// (thread cache -> central cache -> page cache). Larger requests are
/// mapped directly from the OS via the page cache's big-object path.
pub fn concurrent_alloc(bytes: usize) -> *mut u8 {
    if bytes == 0 {
        return ptr::null_mut();
    }

    stat_inc!(alloc_count);
    stat_add!(alloc_bytes, bytes as u64);

    let class = size_class::index(bytes);
    if class != 0 {
        return alloc_small(class);
    }
    alloc_big(bytes)
}

/// Free a pointer previously returned by [`concurrent_alloc`].
pub fn concurrent_free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }

    stat_inc!(dealloc_count);

    let page_id = (ptr as usize) >> PAGE_SHIFT;
    let span = PAGE_MAP.get(page_id);
    if span.is_null() {
        return;
    }

    let sc = unsafe { (*span).size_class };
    if sc != 0 {
        dealloc_small(ptr, sc);
    } else {
        unsafe { PAGE_CACHE.lock().release_span(span) };
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        #[inline]
        fn alloc_small(class: usize) -> *mut u8 {
            match TC_CELL.try_with(|cell| unsafe {
                let tc = &mut *cell.0.get();
                tc.allocate(class, &CENTRAL_CACHE, &PAGE_CACHE, &PAGE_MAP)
            }) {
                Ok(p) => p,
                Err(_) => alloc_from_central(class),
            }
        }

        #[inline]
        fn dealloc_small(ptr: *mut u8, class: usize) {
            if TC_CELL.try_with(|cell| unsafe {
                let tc = &mut *cell.0.get();
                tc.deallocate(ptr, class, &CENTRAL_CACHE, &PAGE_CACHE, &PAGE_MAP);
            })
            .is_err()
            {
                dealloc_to_central(ptr, class);
            }
        }
    } else {
        #[inline]
        fn alloc_small(class: usize) -> *mut u8 {
            alloc_from_central(class)
        }

        #[inline]
        fn dealloc_small(ptr: *mut u8, class: usize) {
            dealloc_to_central(ptr, class);
        }
    }
}

fn alloc_from_central(class: usize) -> *mut u8 {
    stat_inc!(thread_cache_misses);
    let (count, head) =
        unsafe { crate::central_cache::fetch_range(CENTRAL_CACHE.get(class), class, 1, &PAGE_CACHE, &PAGE_MAP) };
    if count == 0 || head.is_null() {
        ptr::null_mut()
    } else {
        head as *mut u8
    }
}

fn dealloc_to_central(ptr: *mut u8, class: usize) {
    let obj = ptr as *mut FreeObject;
    unsafe { (*obj).next = ptr::null_mut() };
    unsafe {
        crate::central_cache::release_range(CENTRAL_CACHE.get(class), obj, 1, &PAGE_CACHE, &PAGE_MAP)
    };
}

/// Serve a request larger than `MAX_BYTES` directly from the page cache.
fn alloc_big(bytes: usize) -> *mut u8 {
    let page_count = bytes.div_ceil(PAGE_SIZE);
    let span = unsafe { PAGE_CACHE.lock().new_span(page_count) };
    if span.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        (*span).size_class = 0;
        (*span).start_addr()
    }
}

/// Global allocator built on [`concurrent_alloc`]/[`concurrent_free`].
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: spancache::SpanCache = spancache::SpanCache;
/// ```
pub struct SpanCache;

unsafe impl GlobalAlloc for SpanCache {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        if size == 0 {
            return layout.align() as *mut u8;
        }

        let align = layout.align();
        if align <= 8 {
            return concurrent_alloc(size);
        }

        let effective_size = size.max(align);
        let class = size_class::index(effective_size);
        if class != 0 {
            let class_size = size_class::class_to_size(class);
            if align <= PAGE_SIZE && class_size.is_multiple_of(align) {
                return concurrent_alloc(effective_size);
            }
        }

        unsafe { self.alloc_over_aligned(layout) }
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        concurrent_free(ptr);
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.alloc(layout) };
        if !ptr.is_null() && layout.size() > 0 {
            unsafe { ptr::write_bytes(ptr, 0, layout.size()) };
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if ptr.is_null() || layout.size() == 0 {
            let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
            return unsafe { self.alloc(new_layout) };
        }

        if new_size == 0 {
            unsafe { self.dealloc(ptr, layout) };
            return layout.align() as *mut u8;
        }

        let page_id = (ptr as usize) >> PAGE_SHIFT;
        let span = PAGE_MAP.get(page_id);
        let old_usable = if !span.is_null() {
            let sc = unsafe { (*span).size_class };
            if sc != 0 {
                size_class::class_to_size(sc)
            } else {
                unsafe { (*span).byte_size() }
            }
        } else {
            layout.size()
        };

        if new_size <= old_usable {
            return ptr;
        }

        let new_layout = unsafe { Layout::from_size_align_unchecked(new_size, layout.align()) };
        let new_ptr = unsafe { self.alloc(new_layout) };
        if !new_ptr.is_null() {
            unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, old_usable.min(new_size)) };
            unsafe { self.dealloc(ptr, layout) };
        }
        new_ptr
    }
}

impl SpanCache {
    /// Over-aligned request (`align > 8`, past what the size-class table can
    /// satisfy directly): over-allocate a span, then trim the prefix/suffix
    /// pages that fall outside the aligned region back to the page cache.
    unsafe fn alloc_over_aligned(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        let align = layout.align();
        let size_pages = size.div_ceil(PAGE_SIZE);

        if align <= PAGE_SIZE {
            let span = unsafe { PAGE_CACHE.lock().new_span(size_pages) };
            if span.is_null() {
                return ptr::null_mut();
            }
            unsafe { (*span).size_class = 0 };
            return unsafe { (*span).start_addr() };
        }

        let align_pages = align / PAGE_SIZE;
        let total_pages = size_pages + align_pages - 1;

        let mut cache = PAGE_CACHE.lock();
        let sp = unsafe { cache.new_span(total_pages) };
        if sp.is_null() {
            return ptr::null_mut();
        }

        let start_addr = unsafe { (*sp).start_addr() } as usize;
        let aligned_addr = (start_addr + align - 1) & !(align - 1);
        let prefix_pages = (aligned_addr - start_addr) / PAGE_SIZE;
        let suffix_pages = total_pages - prefix_pages - size_pages;

        unsafe {
            PAGE_MAP.unregister_span(sp);

            if prefix_pages > 0 {
                let prefix = span::alloc_span();
                if !prefix.is_null() {
                    (*prefix).page_id = (*sp).page_id;
                    (*prefix).page_count = prefix_pages;
                    cache.release_span(prefix);
                }
            }

            (*sp).page_id += prefix_pages;
            (*sp).page_count = size_pages;
            (*sp).size_class = 0;
            PAGE_MAP.register_span(sp);

            if suffix_pages > 0 {
                let suffix = span::alloc_span();
                if !suffix.is_null() {
                    (*suffix).page_id = (*sp).page_id + size_pages;
                    (*suffix).page_count = suffix_pages;
                    cache.release_span(suffix);
                }
            }
        }

        aligned_addr as *mut u8
    }
}
