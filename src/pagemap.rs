//! 3-level radix tree mapping page IDs to Span pointers.
//!
//! For 48-bit virtual addresses with a 12-bit page shift, we have 36 bits of
//! page ID. Split as: root 12 bits, mid 13 bits, leaf 11 bits.
//!
//! The root is statically allocated. Mid and leaf nodes are lazily
//! allocated from the OS. Reads are lock-free (AtomicPtr with Acquire).
//! Writes must happen under external synchronization (the PageCache's
//! global lock).

use crate::config::PAGE_SIZE;
use crate::platform;
use crate::span::Span;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

const ROOT_BITS: usize = 12;
const MID_BITS: usize = 13;
const LEAF_BITS: usize = 11;

const ROOT_LEN: usize = 1 << ROOT_BITS;
const MID_LEN: usize = 1 << MID_BITS;
const LEAF_LEN: usize = 1 << LEAF_BITS;

const MID_SHIFT: usize = LEAF_BITS;
const ROOT_SHIFT: usize = LEAF_BITS + MID_BITS;

const MID_MASK: usize = (1 << MID_BITS) - 1;
const LEAF_MASK: usize = (1 << LEAF_BITS) - 1;

#[repr(C)]
struct MidNode {
    children: [AtomicPtr<LeafNode>; MID_LEN],
}

#[repr(C)]
struct LeafNode {
    spans: [AtomicPtr<Span>; LEAF_LEN],
}

/// 3-level radix tree for page_id -> *mut Span lookup.
pub struct PageMap {
    root: [AtomicPtr<MidNode>; ROOT_LEN],
}

// AtomicPtr is Send+Sync, and we only expose safe operations.
unsafe impl Send for PageMap {}
unsafe impl Sync for PageMap {}

/// Helper to create a const-initialized array of null AtomicPtrs.
macro_rules! null_atomic_array {
    ($len:expr, $T:ty) => {{
        // SAFETY: AtomicPtr<T>::new(null_mut()) is just a null pointer,
        // which has the same bit pattern as zeroed memory.
        unsafe { core::mem::transmute::<[usize; $len], [AtomicPtr<$T>; $len]>([0usize; $len]) }
    }};
}

impl PageMap {
    /// Create a new empty page map. All root entries are null.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            root: null_atomic_array!(ROOT_LEN, MidNode),
        }
    }

    /// Look up the span for a given page ID. Returns null if not set.
    /// This is lock-free.
    #[inline]
    pub fn get(&self, page_id: usize) -> *mut Span {
        let root_idx = page_id >> ROOT_SHIFT;
        let mid_idx = (page_id >> MID_SHIFT) & MID_MASK;
        let leaf_idx = page_id & LEAF_MASK;

        if root_idx >= ROOT_LEN {
            return ptr::null_mut();
        }

        let mid = self.root[root_idx].load(Ordering::Acquire);
        if mid.is_null() {
            return ptr::null_mut();
        }

        let leaf = unsafe { (*mid).children[mid_idx].load(Ordering::Acquire) };
        if leaf.is_null() {
            return ptr::null_mut();
        }

        unsafe { (*leaf).spans[leaf_idx].load(Ordering::Acquire) }
    }

    /// Set the span for a given page ID.
    ///
    /// # Safety
    /// Must be called under external synchronization (the PageCache's global
    /// lock). The span pointer must be valid or null.
    pub unsafe fn set(&self, page_id: usize, span: *mut Span) {
        let root_idx = page_id >> ROOT_SHIFT;
        let mid_idx = (page_id >> MID_SHIFT) & MID_MASK;
        let leaf_idx = page_id & LEAF_MASK;

        assert!(root_idx < ROOT_LEN, "page_id out of range for page map");

        let mut mid = self.root[root_idx].load(Ordering::Acquire);
        if mid.is_null() {
            mid = unsafe { Self::alloc_mid_node() };
            assert!(!mid.is_null(), "failed to allocate mid node for page map");
            self.root[root_idx].store(mid, Ordering::Release);
        }

        let mut leaf = unsafe { (*mid).children[mid_idx].load(Ordering::Acquire) };
        if leaf.is_null() {
            leaf = unsafe { Self::alloc_leaf_node() };
            assert!(!leaf.is_null(), "failed to allocate leaf node for page map");
            unsafe { (*mid).children[mid_idx].store(leaf, Ordering::Release) };
        }

        unsafe { (*leaf).spans[leaf_idx].store(span, Ordering::Release) };
    }

    /// Register a span for every page it covers. Used for all spans pooled
    /// by the PageCache (both free and in-use), so that `span_for_object`
    /// resolves correctly for any internal pointer.
    ///
    /// # Safety
    /// Must be called under external synchronization.
    pub unsafe fn register_span(&self, span: *mut Span) {
        let start = unsafe { (*span).page_id };
        let count = unsafe { (*span).page_count };
        for page_id in start..start + count {
            unsafe { self.set(page_id, span) };
        }
    }

    /// Unregister a span (set all its pages to null).
    ///
    /// # Safety
    /// Must be called under external synchronization.
    pub unsafe fn unregister_span(&self, span: *mut Span) {
        let start = unsafe { (*span).page_id };
        let count = unsafe { (*span).page_count };
        for page_id in start..start + count {
            unsafe { self.set(page_id, ptr::null_mut()) };
        }
    }

    /// Register only the first page of a span. Used solely for big-object
    /// allocations served directly from the OS (never pooled, never
    /// coalesced) where the only pointer ever passed back to us is the
    /// span's base address.
    ///
    /// # Safety
    /// Must be called under external synchronization.
    pub unsafe fn register_first_page(&self, span: *mut Span) {
        let start = unsafe { (*span).page_id };
        unsafe { self.set(start, span) };
    }

    /// Unregister the first page of a span registered with
    /// `register_first_page`.
    ///
    /// # Safety
    /// Must be called under external synchronization.
    pub unsafe fn unregister_first_page(&self, span: *mut Span) {
        let start = unsafe { (*span).page_id };
        unsafe { self.set(start, ptr::null_mut()) };
    }

    unsafe fn alloc_mid_node() -> *mut MidNode {
        let size = core::mem::size_of::<MidNode>();
        let alloc_size = (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let ptr = unsafe { platform::page_alloc(alloc_size) };
        ptr.cast::<MidNode>()
    }

    unsafe fn alloc_leaf_node() -> *mut LeafNode {
        let size = core::mem::size_of::<LeafNode>();
        let alloc_size = (size + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
        let ptr = unsafe { platform::page_alloc(alloc_size) };
        ptr.cast::<LeafNode>()
    }
}
