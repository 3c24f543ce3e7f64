//! Page cache (back-end): manages spans of contiguous pages.
//!
//! Responsibilities:
//! - Allocate spans of N pages, splitting larger free spans when needed
//! - Deallocate spans, coalescing with adjacent free spans
//! - Grow from the OS in fixed NPAGES-1 page increments
//! - Register/unregister spans in the page map
//!
//! Spans requiring NPAGES or more pages bypass the pool entirely: they are
//! mapped directly from the OS on allocation and unmapped directly on
//! release, never split, never coalesced, and registered in the page map
//! only at their first page (nothing ever needs to resolve an interior
//! pointer of such a span back to the span, since it's never carved into
//! objects by a CentralCache).

use crate::config::{NPAGES, PAGE_SHIFT, PAGE_SIZE};
use crate::pagemap::PageMap;
use crate::platform;
use crate::span::{self, Span, SpanList, SpanState};
use core::ptr;

pub struct PageCache {
    /// free_lists[k] holds free spans of exactly k pages, for k in
    /// [1, NPAGES). Index 0 is unused. Coalescing refuses to grow a pooled
    /// span past NPAGES-1 pages (see `coalesce_left`/`coalesce_right`), so
    /// every free span the pool ever holds fits one of these buckets.
    free_lists: [SpanList; NPAGES],
    pagemap: &'static PageMap,
}

// SAFETY: PageCache is only accessed through a SpinMutex. Raw pointers
// within point to OS-allocated memory that outlives any thread.
unsafe impl Send for PageCache {}

impl PageCache {
    pub const fn new(pagemap: &'static PageMap) -> Self {
        Self {
            free_lists: [const { SpanList::new() }; NPAGES],
            pagemap,
        }
    }

    /// Allocate a span of at least `page_count` pages.
    ///
    /// # Safety
    /// Caller must hold exclusive access (via the enclosing `SpinMutex`).
    pub unsafe fn new_span(&mut self, page_count: usize) -> *mut Span {
        assert!(page_count > 0);

        if page_count >= NPAGES {
            return unsafe { self.alloc_big(page_count) };
        }

        for n in page_count..NPAGES {
            if !self.free_lists[n].is_empty() {
                let s = unsafe { self.free_lists[n].pop() };
                return unsafe { self.carve_span(s, page_count) };
            }
        }

        unsafe { self.grow_heap(page_count) }
    }

    /// Release a span previously returned by `new_span`.
    ///
    /// # Safety
    /// `span` must be a valid, in-use span previously returned by `new_span`.
    pub unsafe fn release_span(&mut self, span: *mut Span) {
        if unsafe { (*span).page_count } >= NPAGES {
            unsafe { self.free_big(span) };
            return;
        }

        unsafe {
            (*span).state = SpanState::Free;
            (*span).size_class = 0;
            (*span).free_list_head = ptr::null_mut();
            (*span).use_count = 0;
            (*span).total_count = 0;
        }

        let span = unsafe { self.coalesce_left(span) };
        let span = unsafe { self.coalesce_right(span) };

        unsafe {
            self.pagemap.register_span(span);
            self.insert_free(span);
        }
    }

    /// Split a span: carve out the first `page_count` pages for use, return
    /// the remainder (if any) to the free lists.
    unsafe fn carve_span(&mut self, span: *mut Span, page_count: usize) -> *mut Span {
        let total = unsafe { (*span).page_count };
        assert!(total >= page_count);

        if total > page_count {
            let remainder = span::alloc_span();
            if remainder.is_null() {
                unsafe {
                    (*span).state = SpanState::InUse;
                    self.pagemap.register_span(span);
                }
                return span;
            }

            unsafe {
                (*remainder).page_id = (*span).page_id + page_count;
                (*remainder).page_count = total - page_count;
                (*remainder).state = SpanState::Free;

                (*span).page_count = page_count;

                self.pagemap.register_span(remainder);
                self.insert_free(remainder);
            }
            crate::stat_inc!(span_splits);
        }

        unsafe {
            (*span).state = SpanState::InUse;
            self.pagemap.register_span(span);
        }

        span
    }

    /// Insert a free span into the appropriate free list.
    unsafe fn insert_free(&mut self, span: *mut Span) {
        let n = unsafe { (*span).page_count };
        debug_assert!(n < NPAGES);
        unsafe { self.free_lists[n].push(span) };
    }

    /// Request pages from the OS. Grows by exactly NPAGES-1 pages (the
    /// largest unit the pool buckets), then carves off what's needed.
    unsafe fn grow_heap(&mut self, page_count: usize) -> *mut Span {
        let alloc_pages = NPAGES - 1;
        debug_assert!(page_count <= alloc_pages);
        let alloc_size = alloc_pages * PAGE_SIZE;

        let ptr = unsafe { platform::page_alloc(alloc_size) };
        if ptr.is_null() {
            return ptr::null_mut();
        }

        let page_id = (ptr as usize) >> PAGE_SHIFT;

        let s = span::alloc_span();
        if s.is_null() {
            unsafe { platform::page_dealloc(ptr, alloc_size) };
            return ptr::null_mut();
        }

        unsafe {
            (*s).page_id = page_id;
            (*s).page_count = alloc_pages;
            (*s).state = SpanState::InUse;
        }

        unsafe { self.carve_span(s, page_count) }
    }

    /// Map `page_count` pages directly from the OS. Never pooled: the span
    /// is handed straight to the caller and unmapped straight back to the
    /// OS on release.
    unsafe fn alloc_big(&mut self, page_count: usize) -> *mut Span {
        let alloc_size = page_count * PAGE_SIZE;
        let ptr = unsafe { platform::page_alloc(alloc_size) };
        if ptr.is_null() {
            return ptr::null_mut();
        }

        let page_id = (ptr as usize) >> PAGE_SHIFT;

        let s = span::alloc_span();
        if s.is_null() {
            unsafe { platform::page_dealloc(ptr, alloc_size) };
            return ptr::null_mut();
        }

        unsafe {
            (*s).page_id = page_id;
            (*s).page_count = page_count;
            (*s).state = SpanState::InUse;
            self.pagemap.register_first_page(s);
        }

        s
    }

    unsafe fn free_big(&mut self, span: *mut Span) {
        unsafe {
            self.pagemap.unregister_first_page(span);
            let addr = (*span).start_addr();
            let size = (*span).byte_size();
            platform::page_dealloc(addr, size);
            span::dealloc_span(span);
        }
    }

    /// Try to merge with the free span immediately before `span`. Refuses
    /// to merge if the result would reach NPAGES pages or more — pooled
    /// free spans stay strictly below the OS-direct threshold, so
    /// `release_span` can tell the two paths apart purely from page_count.
    unsafe fn coalesce_left(&mut self, span: *mut Span) -> *mut Span {
        let start = unsafe { (*span).page_id };
        if start == 0 {
            return span;
        }

        let left = self.pagemap.get(start - 1);
        if left.is_null() {
            return span;
        }

        unsafe {
            if (*left).state != SpanState::Free {
                return span;
            }
            if (*left).page_id + (*left).page_count != start {
                return span;
            }
            if (*left).page_count + (*span).page_count >= NPAGES {
                return span;
            }

            let left_pages = (*left).page_count;
            debug_assert!(left_pages < NPAGES);
            self.free_lists[left_pages].remove(left);

            (*left).page_count += (*span).page_count;
            span::dealloc_span(span);
            crate::stat_inc!(span_coalesces);

            left
        }
    }

    /// Try to merge with the free span immediately after `span`, with the
    /// same NPAGES ceiling as `coalesce_left`.
    unsafe fn coalesce_right(&mut self, span: *mut Span) -> *mut Span {
        let end_page = unsafe { (*span).end_page() };

        let right = self.pagemap.get(end_page);
        if right.is_null() {
            return span;
        }

        unsafe {
            if (*right).state != SpanState::Free {
                return span;
            }
            if (*right).page_id != end_page {
                return span;
            }
            if (*right).page_count + (*span).page_count >= NPAGES {
                return span;
            }

            let right_pages = (*right).page_count;
            debug_assert!(right_pages < NPAGES);
            self.free_lists[right_pages].remove(right);

            (*span).page_count += (*right).page_count;
            span::dealloc_span(right);
            crate::stat_inc!(span_coalesces);

            span
        }
    }
}
