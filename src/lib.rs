#![no_std]

//! tinytc: a small-object memory allocator with a tiered cache architecture.
//!
//! Implements a three-tier design:
//! - Thread caches (fast path, no locks) — requires the `std` feature
//! - A central cache (one atomic free list per size class)
//! - A page heap (span management, OS interface)
//!
//! # Usage
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: tinytc::TinyTc = tinytc::TinyTc;
//! ```

#[cfg(test)]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod allocator;
pub mod central_cache;
pub mod config;
pub mod page_heap;
pub mod pagemap;
pub mod platform;
pub mod size_class;
pub mod span;
pub mod sync;
#[cfg(feature = "std")]
pub mod thread_cache;

// Re-export the allocator at crate root for convenience.
pub use allocator::TinyTc;
