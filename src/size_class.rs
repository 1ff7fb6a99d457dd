//! Size-class arithmetic.
//!
//! Every class is a fixed `ALIGN`-byte step from the one before it, so
//! class membership, byte size, and span geometry are all closed-form
//! functions of the class index rather than entries in a lookup table.

use crate::config::{ALIGN, MAX_SMALL, N_CLASSES, PAGE_SIZE, SPAN_PAGES};

/// Sentinel returned by [`class_of`] for requests that don't fit any size
/// class and must be served directly by the page heap.
pub const LARGE: usize = usize::MAX;

/// Map a byte count to its size class.
///
/// `n` must be nonzero; callers are expected to have already rejected
/// zero-size requests before reaching here.
#[inline]
pub fn class_of(n: usize) -> usize {
    debug_assert!(n > 0, "class_of(0) is a precondition violation");
    if n > MAX_SMALL {
        return LARGE;
    }
    n.div_ceil(ALIGN) - 1
}

/// Byte size served by a given class.
#[inline]
pub fn size_of(class: usize) -> usize {
    debug_assert!(class < N_CLASSES, "size class {class} out of range");
    (class + 1) * ALIGN
}

/// Number of pages carved into a span for this class.
///
/// A fixed policy for every class in this design.
#[inline]
pub const fn pages_for_span(_class: usize) -> usize {
    SPAN_PAGES
}

/// Number of blocks of this class's size that fit in one span.
#[inline]
pub fn blocks_per_span(class: usize) -> usize {
    (pages_for_span(class) * PAGE_SIZE) / size_of(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_zero_is_eight_bytes() {
        assert_eq!(size_of(0), 8);
        assert_eq!(class_of(1), 0);
        assert_eq!(class_of(8), 0);
    }

    #[test]
    fn class_boundaries() {
        assert_eq!(class_of(8), 0);
        assert_eq!(class_of(9), 1);
        assert_eq!(size_of(class_of(9)), 16);
    }

    #[test]
    fn rounds_up_to_next_class() {
        assert_eq!(size_of(class_of(1)), 8);
        assert_eq!(size_of(class_of(7)), 8);
        assert_eq!(size_of(class_of(9)), 16);
        assert_eq!(size_of(class_of(15)), 16);
        assert_eq!(size_of(class_of(17)), 24);
    }

    #[test]
    fn round_trip_all_classes() {
        for class in 0..N_CLASSES {
            let size = size_of(class);
            assert_eq!(class_of(size), class);
        }
    }

    #[test]
    fn sizes_are_monotonic_and_aligned() {
        let mut prev = 0;
        for class in 0..N_CLASSES {
            let size = size_of(class);
            assert!(size > prev);
            assert_eq!(size % ALIGN, 0);
            prev = size;
        }
    }

    #[test]
    fn max_small_is_last_class() {
        assert_eq!(class_of(MAX_SMALL), N_CLASSES - 1);
        assert_eq!(size_of(N_CLASSES - 1), MAX_SMALL);
    }

    #[test]
    fn above_max_small_is_large() {
        assert_eq!(class_of(MAX_SMALL + 1), LARGE);
        assert_eq!(class_of(10 * MAX_SMALL), LARGE);
    }

    #[test]
    fn blocks_per_span_fits_in_span() {
        for class in [0, 1, 63, 4095, N_CLASSES - 1] {
            let n = blocks_per_span(class);
            assert!(n >= 1);
            assert!(n * size_of(class) <= pages_for_span(class) * PAGE_SIZE);
        }
    }

    #[test]
    fn blocks_per_span_512_byte_class() {
        // size_of(class) = 512 => class = 63
        let class = class_of(512);
        assert_eq!(size_of(class), 512);
        assert_eq!(blocks_per_span(class), 64);
    }
}
