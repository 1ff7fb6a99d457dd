//! Top-level allocator: ties the three tiers together and exposes both the
//! two-primitive facade (`allocate_bytes`/`deallocate_bytes`) and a
//! `GlobalAlloc` adapter built on top of it.
//!
//! Static state lives here. `TinyTc` is zero-sized; all mutable state is in
//! module-level statics protected by spinlocks or atomics.
//!
//! Cache strategy:
//! - `std` feature: one `ThreadCache` per OS thread via `std::thread_local!`
//! - neither: central cache only (locked, a bit slower, still correct)

use crate::central_cache::CentralCache;
use crate::config::{ALIGN, PAGE_SIZE};
use crate::page_heap::PageHeap;
use crate::pagemap::PageMap;
use crate::size_class::{self, LARGE};
use crate::span::{self, SpanState};
use crate::sync::SpinMutex;
use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

#[cfg(feature = "std")]
use crate::thread_cache::ThreadCache;

pub(crate) static PAGE_MAP: PageMap = PageMap::new();
pub(crate) static PAGE_HEAP: SpinMutex<PageHeap> = SpinMutex::new(PageHeap::new(&PAGE_MAP));
pub(crate) static CENTRAL_CACHE: CentralCache = CentralCache::new();

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        struct ThreadCacheCell(core::cell::UnsafeCell<ThreadCache>);

        // SAFETY: a thread-local is only ever touched by the thread that owns it.
        unsafe impl Sync for ThreadCacheCell {}

        impl ThreadCacheCell {
            const fn new() -> Self {
                Self(core::cell::UnsafeCell::new(ThreadCache::new()))
            }
        }

        impl Drop for ThreadCacheCell {
            fn drop(&mut self) {
                // Flush so blocks cached by this thread don't become
                // unreachable once its thread-local storage is gone.
                unsafe { (*self.0.get()).flush(&CENTRAL_CACHE) };
            }
        }

        std::thread_local! {
            static TC: ThreadCacheCell = const { ThreadCacheCell::new() };
        }

        #[inline]
        fn with_thread_cache<R>(f: impl FnOnce(&mut ThreadCache) -> R) -> Option<R> {
            TC.try_with(|cell| unsafe { f(&mut *cell.0.get()) }).ok()
        }
    }
}

/// Allocate `n` bytes (`n > 0`), routing through a size class when
/// `n <= MAX_SMALL` and directly through the page heap otherwise.
///
/// Returns null on out-of-memory.
#[inline]
pub fn allocate_bytes(n: usize) -> *mut u8 {
    debug_assert!(n > 0, "allocate_bytes(0) is a precondition violation");

    let class = size_class::class_of(n);
    if class == LARGE {
        return alloc_large(n);
    }

    #[cfg(feature = "std")]
    {
        if let Some(ptr) = with_thread_cache(|tc| unsafe {
            tc.allocate(class, &CENTRAL_CACHE, &PAGE_HEAP)
        }) {
            return ptr;
        }
    }

    unsafe { CENTRAL_CACHE.fetch_range(class, &PAGE_HEAP) as *mut u8 }
}

/// Deallocate a region previously returned by `allocate_bytes(n)`.
#[inline]
pub fn deallocate_bytes(addr: *mut u8, n: usize) {
    if addr.is_null() {
        return;
    }

    let class = size_class::class_of(n);
    if class == LARGE {
        let pages = n.div_ceil(PAGE_SIZE);
        unsafe { PAGE_HEAP.lock().deallocate_span(addr, pages) };
        return;
    }

    #[cfg(feature = "std")]
    {
        let handled = with_thread_cache(|tc| unsafe {
            tc.deallocate(addr, class, &CENTRAL_CACHE);
        });
        if handled.is_some() {
            return;
        }
    }

    unsafe { CENTRAL_CACHE.return_range(addr, class) };
}

fn alloc_large(n: usize) -> *mut u8 {
    let pages = n.div_ceil(PAGE_SIZE);
    let span = unsafe { PAGE_HEAP.lock().allocate_span(pages) };
    if span.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*span).start_addr() }
}

/// Allocate `size` bytes aligned to `align`, where `align > ALIGN`.
///
/// No size class guarantees alignment beyond `ALIGN`, so over-aligned
/// requests always go through the page heap. Page-granular memory is
/// already aligned to `PAGE_SIZE`; only `align > PAGE_SIZE` needs the
/// over-allocate-and-trim treatment (tcmalloc's `do_memalign` approach).
fn alloc_large_aligned(size: usize, align: usize) -> *mut u8 {
    debug_assert!(align > ALIGN);
    let size_pages = size.div_ceil(PAGE_SIZE);

    if align <= PAGE_SIZE {
        return alloc_large(size.max(1));
    }

    let align_pages = align / PAGE_SIZE;
    let total_pages = size_pages + align_pages - 1;

    let mut heap = PAGE_HEAP.lock();
    let span = unsafe { heap.allocate_span(total_pages) };
    if span.is_null() {
        return ptr::null_mut();
    }

    let start_addr = unsafe { (*span).start_addr() } as usize;
    let aligned_addr = (start_addr + align - 1) & !(align - 1);
    let prefix_pages = (aligned_addr - start_addr) / PAGE_SIZE;
    let suffix_pages = total_pages - prefix_pages - size_pages;

    unsafe {
        PAGE_MAP.unregister_span(span);

        if prefix_pages > 0 {
            let prefix = span::alloc_span();
            if !prefix.is_null() {
                (*prefix).start_page = (*span).start_page;
                (*prefix).num_pages = prefix_pages;
                heap.free_span(prefix);
            }
        }

        (*span).start_page += prefix_pages;
        (*span).num_pages = size_pages;
        (*span).state = SpanState::InUse;
        PAGE_MAP.register_span(span);

        if suffix_pages > 0 {
            let suffix = span::alloc_span();
            if !suffix.is_null() {
                (*suffix).start_page = (*span).start_page + size_pages;
                (*suffix).num_pages = suffix_pages;
                heap.free_span(suffix);
            }
        }
    }

    aligned_addr as *mut u8
}

/// The allocator's `GlobalAlloc` facade.
///
/// Register as the global allocator with:
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: tinytc::TinyTc = tinytc::TinyTc;
/// ```
pub struct TinyTc;

unsafe impl GlobalAlloc for TinyTc {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        if size == 0 {
            return layout.align() as *mut u8;
        }

        let align = layout.align();
        if align > ALIGN {
            return alloc_large_aligned(size, align);
        }

        allocate_bytes(size)
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let size = layout.size();
        if size == 0 {
            return;
        }

        let align = layout.align();
        if align > ALIGN {
            let pages = size.div_ceil(PAGE_SIZE);
            unsafe { PAGE_HEAP.lock().deallocate_span(ptr, pages) };
            return;
        }

        deallocate_bytes(ptr, size);
    }
}
