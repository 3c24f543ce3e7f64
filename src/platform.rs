//! OS platform abstraction for virtual memory allocation.
//!
//! Provides `page_alloc` and `page_dealloc` that wrap platform-specific
//! virtual memory APIs (VirtualAlloc on Windows, mmap on Unix). Under Miri,
//! raw `mmap`/`VirtualAlloc` FFI is unsupported, so a `std::alloc`-backed
//! shim stands in, letting the rest of the test suite run under Miri for
//! undefined-behavior detection.

#[cfg(all(windows, not(miri)))]
mod windows;

#[cfg(all(unix, not(miri)))]
mod unix;

#[cfg(miri)]
mod miri;

/// Allocate `size` bytes of virtual memory, page-aligned.
/// Returns null on failure. Memory is zero-initialized by the OS.
/// `size` is rounded up to the platform allocation granularity.
///
/// # Safety
/// Caller must eventually call `page_dealloc` with the returned pointer and
/// the same `size` (before rounding).
#[inline]
pub unsafe fn page_alloc(size: usize) -> *mut u8 {
    let ptr = {
        #[cfg(miri)]
        {
            unsafe { miri::page_alloc(size) }
        }
        #[cfg(all(windows, not(miri)))]
        {
            unsafe { windows::page_alloc(size) }
        }
        #[cfg(all(unix, not(miri)))]
        {
            unsafe { unix::page_alloc(size) }
        }
    };
    if !ptr.is_null() {
        crate::stat_inc!(os_alloc_count);
        crate::stat_add!(os_alloc_bytes, size as u64);
    }
    ptr
}

/// Free virtual memory previously allocated by `page_alloc`.
///
/// # Safety
/// `ptr` must have been returned by `page_alloc`, and `size` must match the
/// original allocation size.
#[inline]
pub unsafe fn page_dealloc(ptr: *mut u8, _size: usize) {
    #[cfg(miri)]
    {
        unsafe { miri::page_dealloc(ptr, _size) };
    }
    #[cfg(all(windows, not(miri)))]
    {
        unsafe { windows::page_dealloc(ptr) };
    }
    #[cfg(all(unix, not(miri)))]
    {
        unsafe { unix::page_dealloc(ptr, _size) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;

    #[test]
    fn test_alloc_and_dealloc() {
        unsafe {
            let ptr = page_alloc(PAGE_SIZE);
            assert!(!ptr.is_null());
            for i in 0..PAGE_SIZE {
                assert_eq!(*ptr.add(i), 0);
            }
            for i in 0..PAGE_SIZE {
                *ptr.add(i) = (i & 0xFF) as u8;
            }
            for i in 0..PAGE_SIZE {
                assert_eq!(*ptr.add(i), (i & 0xFF) as u8);
            }
            page_dealloc(ptr, PAGE_SIZE);
        }
    }

    #[test]
    fn test_alloc_multiple_pages() {
        unsafe {
            let size = PAGE_SIZE * 8;
            let ptr = page_alloc(size);
            assert!(!ptr.is_null());
            *ptr = 0xAA;
            *ptr.add(size - 1) = 0xBB;
            assert_eq!(*ptr, 0xAA);
            assert_eq!(*ptr.add(size - 1), 0xBB);
            page_dealloc(ptr, size);
        }
    }

    #[test]
    fn test_alloc_large() {
        unsafe {
            let size = 1024 * 1024; // 1 MiB
            let ptr = page_alloc(size);
            assert!(!ptr.is_null());
            page_dealloc(ptr, size);
        }
    }
}
