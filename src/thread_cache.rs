//! Thread cache (front-end): per-thread free lists for lock-free allocation.
//!
//! Each thread gets its own `ThreadCache`. The fast path (cache hit) needs
//! no synchronization at all. When a size class's list runs dry or grows
//! past its current cap, the thread cache batches a transfer to/from the
//! central cache.
//!
//! Growth is a simple slow start: a freshly touched size class moves one
//! object at a time; `max_size` climbs by one object per refill until it
//! reaches the size class's batch limit, then stays there. There is no
//! global cache-size budget and no low-water-mark scavenging — a thread
//! cache only ever holds as much as its own traffic has earned it.

use crate::central_cache::CentralCache;
use crate::page_cache::PageCache;
use crate::pagemap::PageMap;
use crate::size_class::{self, FREE_LIST_COUNT};
use crate::span::FreeObject;
use crate::sync::SpinMutex;
use core::ptr;

/// Per-size-class free list within a thread cache.
struct FreeList {
    head: *mut FreeObject,
    length: u32,
    /// Current cap before objects are returned to the central cache. Grows
    /// by one per refill, capped at the size class's batch limit.
    max_size: u32,
}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            length: 0,
            max_size: 1,
        }
    }

    #[inline]
    fn pop(&mut self) -> *mut FreeObject {
        let obj = self.head;
        if !obj.is_null() {
            self.head = unsafe { (*obj).next };
            self.length -= 1;
        }
        obj
    }

    #[inline]
    fn push(&mut self, obj: *mut FreeObject) {
        unsafe { (*obj).next = self.head };
        self.head = obj;
        self.length += 1;
    }

    fn push_batch(&mut self, head: *mut FreeObject, count: u32) {
        if head.is_null() || count == 0 {
            return;
        }
        let mut tail = head;
        for _ in 1..count {
            let next = unsafe { (*tail).next };
            if next.is_null() {
                break;
            }
            tail = next;
        }
        unsafe { (*tail).next = self.head };
        self.head = head;
        self.length += count;
    }

    /// Pop up to `count` objects into a linked list, returning
    /// (actual_count, head, tail).
    fn pop_batch(&mut self, count: u32) -> (u32, *mut FreeObject, *mut FreeObject) {
        let mut head: *mut FreeObject = ptr::null_mut();
        let mut tail: *mut FreeObject = ptr::null_mut();
        let mut popped = 0u32;
        while popped < count && !self.head.is_null() {
            let obj = self.head;
            self.head = unsafe { (*obj).next };
            unsafe { (*obj).next = head };
            if tail.is_null() {
                tail = obj;
            }
            head = obj;
            self.length -= 1;
            popped += 1;
        }
        (popped, head, tail)
    }
}

/// Per-thread cache holding a free list for each size class.
pub struct ThreadCache {
    lists: [FreeList; FREE_LIST_COUNT],
}

impl Default for ThreadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadCache {
    pub const fn new() -> Self {
        Self {
            lists: [const { FreeList::new() }; FREE_LIST_COUNT],
        }
    }

    /// Flush every cached object back to the central cache. Called once,
    /// on thread exit.
    ///
    /// # Safety
    /// Must only be called once per thread cache lifetime.
    pub unsafe fn flush_and_destroy(
        &mut self,
        central: &CentralCache,
        page_cache: &SpinMutex<PageCache>,
        pagemap: &PageMap,
    ) {
        for cls in 1..FREE_LIST_COUNT {
            let list = &mut self.lists[cls];
            if list.length > 0 {
                let (count, head, _tail) = list.pop_batch(list.length);
                if count > 0 {
                    unsafe {
                        crate::central_cache::release_range(
                            central.get(cls),
                            head,
                            count as usize,
                            page_cache,
                            pagemap,
                        )
                    };
                }
            }
        }
    }

    /// Allocate an object of the given size class. Returns null on OOM.
    ///
    /// # Safety
    /// `size_class` must be a valid index in `1..FREE_LIST_COUNT`.
    #[inline]
    pub unsafe fn allocate(
        &mut self,
        size_class: usize,
        central: &CentralCache,
        page_cache: &SpinMutex<PageCache>,
        pagemap: &PageMap,
    ) -> *mut u8 {
        let list = &mut self.lists[size_class];
        let obj = list.pop();
        if !obj.is_null() {
            crate::stat_inc!(thread_cache_hits);
            return obj as *mut u8;
        }
        unsafe { self.fetch_from_central(size_class, central, page_cache, pagemap) }
    }

    /// Deallocate an object of the given size class.
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior `allocate` call for
    /// `size_class`.
    #[inline]
    pub unsafe fn deallocate(
        &mut self,
        ptr: *mut u8,
        size_class: usize,
        central: &CentralCache,
        page_cache: &SpinMutex<PageCache>,
        pagemap: &PageMap,
    ) {
        let list = &mut self.lists[size_class];
        let obj = ptr as *mut FreeObject;
        list.push(obj);

        if list.length >= list.max_size {
            unsafe { self.release_to_central(size_class, central, page_cache, pagemap) };
        }
    }

    /// Slow path: fetch a batch from the central cache. Fetches
    /// `min(max_size, batch_limit)` objects, keeps one for the caller, and
    /// caches the rest; grows `max_size` by one (capped at the batch
    /// limit) so the next miss fetches a slightly larger batch.
    #[cold]
    unsafe fn fetch_from_central(
        &mut self,
        size_class: usize,
        central: &CentralCache,
        page_cache: &SpinMutex<PageCache>,
        pagemap: &PageMap,
    ) -> *mut u8 {
        let info = size_class::class_info(size_class);
        let list = &mut self.lists[size_class];
        let num_to_fetch = (list.max_size as usize).min(info.batch_size).max(1);

        let (count, head) = unsafe {
            crate::central_cache::fetch_range(
                central.get(size_class),
                size_class,
                num_to_fetch,
                page_cache,
                pagemap,
            )
        };

        if count == 0 || head.is_null() {
            return ptr::null_mut();
        }

        let result = head;
        let remaining_head = unsafe { (*head).next };
        let remaining_count = count - 1;

        if remaining_count > 0 {
            list.push_batch(remaining_head, remaining_count as u32);
        }

        if (list.max_size as usize) < info.batch_size {
            list.max_size += 1;
        }

        result as *mut u8
    }

    /// Release exactly `max_size` objects back to the central cache
    /// (slow-start growth keeps `max_size` from exceeding the batch limit,
    /// so this never drains the whole list at once once warmed up).
    unsafe fn release_to_central(
        &mut self,
        size_class: usize,
        central: &CentralCache,
        page_cache: &SpinMutex<PageCache>,
        pagemap: &PageMap,
    ) {
        let list = &mut self.lists[size_class];
        let to_release = list.max_size.min(list.length);
        if to_release == 0 {
            return;
        }

        let (count, head, _tail) = list.pop_batch(to_release);
        unsafe {
            crate::central_cache::release_range(
                central.get(size_class),
                head,
                count as usize,
                page_cache,
                pagemap,
            )
        };
    }
}
