//! Size class table and lookup functions.
//!
//! Requests are bucketed into size classes using piecewise alignment: small
//! sizes round up to a fine granularity, large sizes to a coarse one, so the
//! total number of classes stays small while relative waste stays bounded.
//!
//!   [1,       128]  align   8   ( 16 classes)
//!   [129,    1024]  align  16   ( 56 classes)
//!   [1025,   8192]  align 128   ( 56 classes)
//!   [8193,  65536]  align 1024  ( 56 classes)
//!
//! Class 0 is an unused sentinel (mirrors how a size class index of 0 means
//! "not a small allocation" at the call sites in `allocator.rs`).

use crate::config::{MAX_BYTES, PAGE_SHIFT};

const BAND1_MAX: usize = 128;
const BAND2_MAX: usize = 1024;
const BAND3_MAX: usize = 8192;
const BAND4_MAX: usize = MAX_BYTES;

const ALIGN1: usize = 8;
const ALIGN2: usize = 16;
const ALIGN3: usize = 128;
const ALIGN4: usize = 1024;

const BAND1_CLASSES: usize = BAND1_MAX / ALIGN1; // 16
const BAND2_CLASSES: usize = (BAND2_MAX - BAND1_MAX) / ALIGN2; // 56
const BAND3_CLASSES: usize = (BAND3_MAX - BAND2_MAX) / ALIGN3; // 56
const BAND4_CLASSES: usize = (BAND4_MAX - BAND3_MAX) / ALIGN4; // 56

/// Number of real size classes (excludes the sentinel at index 0).
pub const NUM_REAL_CLASSES: usize = BAND1_CLASSES + BAND2_CLASSES + BAND3_CLASSES + BAND4_CLASSES;

/// Total number of entries in the size-class table, including the sentinel.
pub const FREE_LIST_COUNT: usize = NUM_REAL_CLASSES + 1;

#[inline]
const fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

#[inline]
const fn div_ceil_usize(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

/// Allocation size for size class `cls` (1..=NUM_REAL_CLASSES).
const fn class_size_raw(cls: usize) -> usize {
    if cls <= BAND1_CLASSES {
        cls * ALIGN1
    } else if cls <= BAND1_CLASSES + BAND2_CLASSES {
        let j = cls - BAND1_CLASSES;
        BAND1_MAX + j * ALIGN2
    } else if cls <= BAND1_CLASSES + BAND2_CLASSES + BAND3_CLASSES {
        let j = cls - BAND1_CLASSES - BAND2_CLASSES;
        BAND2_MAX + j * ALIGN3
    } else {
        let j = cls - BAND1_CLASSES - BAND2_CLASSES - BAND3_CLASSES;
        BAND3_MAX + j * ALIGN4
    }
}

/// Batch width (number of objects moved between ThreadCache and CentralCache
/// in one lock acquisition) for a given rounded object size. Clamped to
/// [2, 512]; larger objects move in smaller batches.
const fn batch_limit_for_size(size: usize) -> usize {
    let raw = MAX_BYTES / size;
    let clamped = if raw < 2 {
        2
    } else if raw > 512 {
        512
    } else {
        raw
    };
    clamped
}

/// Page count of a freshly carved span for a given rounded object size,
/// chosen so the span holds at least `batch_limit` objects.
const fn span_page_count_for_size(size: usize, batch_limit: usize) -> usize {
    let bytes_needed = batch_limit * size;
    let pages = div_ceil_usize(bytes_needed, 1 << PAGE_SHIFT);
    if pages == 0 { 1 } else { pages }
}

/// Precomputed metadata for a single size class.
#[derive(Clone, Copy)]
pub struct SizeClassInfo {
    /// Allocation size for this class (bytes). All requests in this class
    /// are rounded up to this size.
    pub size: usize,
    /// Number of pages a freshly carved span for this class contains.
    pub pages: usize,
    /// Number of objects transferred between ThreadCache and CentralCache
    /// in one batch.
    pub batch_size: usize,
}

impl SizeClassInfo {
    pub const fn objects_per_span(&self) -> usize {
        (self.pages << PAGE_SHIFT) / self.size
    }
}

/// The size-class table, computed once at compile time. Index 0 is an
/// unused sentinel.
pub static SIZE_CLASSES: [SizeClassInfo; FREE_LIST_COUNT] = const {
    let mut table = [SizeClassInfo {
        size: 0,
        pages: 0,
        batch_size: 0,
    }; FREE_LIST_COUNT];
    let mut cls = 1;
    while cls <= NUM_REAL_CLASSES {
        let size = class_size_raw(cls);
        let batch_size = batch_limit_for_size(size);
        let pages = span_page_count_for_size(size, batch_size);
        table[cls] = SizeClassInfo {
            size,
            pages,
            batch_size,
        };
        cls += 1;
    }
    table
};

/// Map a request size to its size class index.
///
/// Returns 0 for `size == 0` or `size > MAX_BYTES` (the caller must route
/// zero-sized and big-object requests elsewhere; this table only covers the
/// four alignment bands above).
#[inline]
pub fn index(bytes: usize) -> usize {
    if bytes == 0 || bytes > MAX_BYTES {
        return 0;
    }
    if bytes <= BAND1_MAX {
        div_ceil_usize(bytes, ALIGN1)
    } else if bytes <= BAND2_MAX {
        BAND1_CLASSES + div_ceil_usize(bytes - BAND1_MAX, ALIGN2)
    } else if bytes <= BAND3_MAX {
        BAND1_CLASSES + BAND2_CLASSES + div_ceil_usize(bytes - BAND2_MAX, ALIGN3)
    } else {
        BAND1_CLASSES + BAND2_CLASSES + BAND3_CLASSES + div_ceil_usize(bytes - BAND3_MAX, ALIGN4)
    }
}

/// Rounded allocation size for a request of `bytes`.
#[inline]
pub fn aligned_size(bytes: usize) -> usize {
    SIZE_CLASSES[index(bytes)].size
}

/// Allocation size for a given size class index.
#[inline]
pub fn class_to_size(cls: usize) -> usize {
    SIZE_CLASSES[cls].size
}

/// Size-class metadata for a given class index.
#[inline]
pub fn class_info(cls: usize) -> &'static SizeClassInfo {
    &SIZE_CLASSES[cls]
}

/// Round `bytes` up to a page-size multiple.
#[inline]
pub const fn round_up_to_page(bytes: usize) -> usize {
    round_up(bytes, 1 << PAGE_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_maps_to_sentinel() {
        assert_eq!(index(0), 0);
    }

    #[test]
    fn oversized_maps_to_sentinel() {
        assert_eq!(index(MAX_BYTES + 1), 0);
    }

    #[test]
    fn exact_boundaries_round_trip() {
        for &n in &[1usize, 8, 128, 129, 1024, 1025, 8192, 8193, 65536] {
            let cls = index(n);
            assert!(cls != 0, "size {n} should not map to sentinel");
            let size = class_to_size(cls);
            assert!(size >= n, "class {cls} size {size} smaller than request {n}");
        }
    }

    #[test]
    fn table_is_monotone() {
        for cls in 2..=NUM_REAL_CLASSES {
            assert!(
                SIZE_CLASSES[cls].size > SIZE_CLASSES[cls - 1].size,
                "class {cls} not strictly greater than class {}",
                cls - 1
            );
        }
    }

    #[test]
    fn monotone_size_implies_monotone_aligned() {
        let mut prev = 0;
        for n in (1..=MAX_BYTES).step_by(37) {
            let a = aligned_size(n);
            assert!(a >= prev || n == 1);
            prev = a;
        }
    }

    #[test]
    fn index_is_smallest_fit() {
        for &n in &[1usize, 7, 9, 65, 130, 257, 1025, 1200, 8193, 10000, 65536] {
            let cls = index(n);
            let size = class_to_size(cls);
            assert!(size >= n);
            if cls > 1 {
                assert!(class_to_size(cls - 1) < n);
            }
        }
    }

    #[test]
    fn objects_per_span_fits() {
        for cls in 1..=NUM_REAL_CLASSES {
            let info = &SIZE_CLASSES[cls];
            let objs = info.objects_per_span();
            assert!(objs >= 1, "class {cls} has 0 objects per span");
            assert!(objs * info.size <= info.pages << PAGE_SHIFT);
        }
    }

    #[test]
    fn batch_size_in_range() {
        for cls in 1..=NUM_REAL_CLASSES {
            let b = SIZE_CLASSES[cls].batch_size;
            assert!((2..=512).contains(&b));
        }
    }
}
