//! Central cache (middle-end): per-size-class shared object pools.
//!
//! Each size class has its own lock (fine-grained). Thread caches fetch and
//! return batches of objects here. When a central list runs dry it pulls a
//! fresh span straight from the page cache and carves it into objects;
//! spans that become completely free are unconditionally handed back.

use crate::config::PAGE_SHIFT;
use crate::page_cache::PageCache;
use crate::pagemap::PageMap;
use crate::size_class::{self, FREE_LIST_COUNT};
use crate::span::{FreeObject, Span, SpanList, SpanState};
use crate::sync::SpinMutex;
use core::ptr;

/// Central pool for a single size class.
pub struct CentralFreeList {
    size_class: usize,
    /// Spans that have at least one free object.
    nonempty_spans: SpanList,
    num_free: usize,
}

// SAFETY: Only accessed through external SpinMutex synchronization.
unsafe impl Send for CentralFreeList {}

impl CentralFreeList {
    pub const fn new(size_class: usize) -> Self {
        Self {
            size_class,
            nonempty_spans: SpanList::new(),
            num_free: 0,
        }
    }

    /// Carve a freshly allocated span into objects and add it to the pool.
    unsafe fn inject_span(&mut self, span: *mut Span, pagemap: &PageMap) {
        let info = size_class::class_info(self.size_class);
        let obj_size = info.size;

        unsafe {
            (*span).size_class = self.size_class;
            (*span).state = SpanState::InUse;

            pagemap.register_span(span);

            let base = (*span).start_addr();
            let span_bytes = (*span).byte_size();
            let num_objects = span_bytes / obj_size;

            (*span).total_count = num_objects as u32;
            (*span).use_count = 0;

            let mut free_list: *mut FreeObject = ptr::null_mut();
            for i in (0..num_objects).rev() {
                let obj = base.add(i * obj_size) as *mut FreeObject;
                (*obj).next = free_list;
                free_list = obj;
            }

            (*span).free_list_head = free_list;
            self.num_free += num_objects;
            self.nonempty_spans.push(span);
        }
    }
}

/// Remove up to `batch_size` objects from a size class's central pool,
/// dropping the central lock while a fresh span is being requested from the
/// page cache. This keeps threads wanting the same size class from blocking
/// on a sibling thread that's stuck waiting on the OS.
///
/// # Safety
/// `page_cache` and `pagemap` must be the global instances.
pub unsafe fn fetch_range(
    cfl_lock: &SpinMutex<CentralFreeList>,
    size_class: usize,
    batch_size: usize,
    page_cache: &SpinMutex<PageCache>,
    pagemap: &PageMap,
) -> (usize, *mut FreeObject) {
    let info = size_class::class_info(size_class);
    let mut head: *mut FreeObject = ptr::null_mut();
    let mut count = 0;

    loop {
        {
            let mut cfl = cfl_lock.lock();

            while count < batch_size && !cfl.nonempty_spans.is_empty() {
                let span = cfl.nonempty_spans.head;
                unsafe {
                    while count < batch_size && !(*span).free_list_head.is_null() {
                        let obj = (*span).free_list_head;
                        (*span).free_list_head = (*obj).next;
                        (*obj).next = head;
                        head = obj;
                        (*span).use_count += 1;
                        count += 1;
                        cfl.num_free -= 1;
                    }
                    if (*span).free_list_head.is_null() {
                        cfl.nonempty_spans.remove(span);
                    }
                }
            }

            if count >= batch_size {
                return (count, head);
            }
            // nonempty_spans is empty; the central lock drops here while we
            // go fetch a new span.
        }

        let span = unsafe { page_cache.lock().new_span(info.pages) };
        if span.is_null() {
            return (count, head); // OOM, return what we have
        }

        {
            let mut cfl = cfl_lock.lock();
            unsafe { cfl.inject_span(span, pagemap) };
        }
    }
}

/// Insert a batch of objects back into a size class's central pool. Any
/// span that becomes fully free is unconditionally returned to the page
/// cache (the central pool never holds on to empty spans).
///
/// # Safety
/// `head` must point to a valid linked list of `count` `FreeObject`s that
/// were previously allocated from this size class's spans.
pub unsafe fn release_range(
    cfl_lock: &SpinMutex<CentralFreeList>,
    mut head: *mut FreeObject,
    count: usize,
    page_cache: &SpinMutex<PageCache>,
    pagemap: &PageMap,
) {
    const MAX_FREED: usize = 8;
    let mut freed_spans: [*mut Span; MAX_FREED] = [ptr::null_mut(); MAX_FREED];
    let mut num_freed = 0;

    {
        let mut cfl = cfl_lock.lock();
        let mut remaining = count;

        while !head.is_null() && remaining > 0 {
            let obj = head;
            unsafe { head = (*obj).next };
            remaining -= 1;

            let page_id = (obj as usize) >> PAGE_SHIFT;
            let span = pagemap.get(page_id);
            if span.is_null() {
                continue;
            }

            unsafe {
                let was_full = (*span).free_list_head.is_null();

                (*obj).next = (*span).free_list_head;
                (*span).free_list_head = obj;
                (*span).use_count -= 1;
                cfl.num_free += 1;

                if was_full {
                    cfl.nonempty_spans.push(span);
                }

                if (*span).use_count == 0 {
                    cfl.nonempty_spans.remove(span);
                    cfl.num_free -= (*span).total_count as usize;
                    (*span).free_list_head = ptr::null_mut();

                    if num_freed < MAX_FREED {
                        freed_spans[num_freed] = span;
                        num_freed += 1;
                    } else {
                        page_cache.lock().release_span(span);
                    }
                }
            }
        }
    }

    for span in freed_spans.iter().take(num_freed) {
        unsafe { page_cache.lock().release_span(*span) };
    }
}

/// Array of central pools, one per size class (including the unused
/// sentinel at index 0, for uniform indexing by class id).
pub struct CentralCache {
    lists: [SpinMutex<CentralFreeList>; FREE_LIST_COUNT],
}

impl Default for CentralCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CentralCache {
    pub const fn new() -> Self {
        let mut lists = [const { SpinMutex::new(CentralFreeList::new(0)) }; FREE_LIST_COUNT];
        let mut i = 0;
        while i < FREE_LIST_COUNT {
            lists[i] = SpinMutex::new(CentralFreeList::new(i));
            i += 1;
        }
        Self { lists }
    }

    #[inline]
    pub fn get(&self, size_class: usize) -> &SpinMutex<CentralFreeList> {
        &self.lists[size_class]
    }
}
