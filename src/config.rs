//! Compile-time tunables for the allocator.
//!
//! Unlike the curated, non-uniform size-class table an allocator tuned for
//! real-world object-size distributions would carry, every class here is a
//! fixed 8-byte step from the one before it, so these constants are plain
//! formulas rather than a generated table.

/// Alignment granularity, and the size of class 0.
pub const ALIGN: usize = 8;

/// Base-2 log of the page size.
pub const PAGE_SHIFT: usize = 12;
/// Page size in bytes (4 KiB), matching native mmap/VirtualAlloc granularity.
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Largest request routed through a size class. Anything bigger goes straight
/// to the page heap as a "large" allocation.
pub const MAX_SMALL: usize = 256 * 1024;

/// Number of size classes: one per 8-byte increment up to `MAX_SMALL`.
pub const N_CLASSES: usize = MAX_SMALL / ALIGN;

/// Pages carved into a span whenever a size class needs more blocks.
pub const SPAN_PAGES: usize = 8;

/// Largest page count the page heap's free-list array indexes directly.
/// Free spans bigger than this live in an unindexed best-fit list instead.
pub const MAX_PAGES: usize = 128;

/// Per-class live-block count a thread cache tolerates before it spills
/// back to the central cache, and drains down to half of on a spill.
pub const THREAD_CACHE_HIGH_WATER: usize = 32;
