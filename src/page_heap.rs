//! Page Heap (back-end): manages spans of contiguous pages.
//!
//! Responsibilities:
//! - Allocate spans of N pages (searching free lists, splitting larger spans)
//! - Deallocate spans, coalescing with the physically-following free span
//! - Grow the heap by requesting memory from the OS
//! - Register/unregister spans in the page map

use crate::config::{MAX_PAGES, PAGE_SHIFT, PAGE_SIZE};
use crate::pagemap::PageMap;
use crate::platform;
use crate::span::{self, Span, SpanList, SpanState};
use core::ptr;

pub struct PageHeap {
    /// free_lists[k] holds free spans of exactly k pages (index 0 unused).
    free_lists: [SpanList; MAX_PAGES + 1],
    /// Free spans larger than MAX_PAGES pages.
    large_spans: SpanList,
    /// Reference to the global page map.
    pagemap: &'static PageMap,
}

// SAFETY: PageHeap is only accessed through a SpinMutex. Raw pointers within
// point to OS-allocated memory that outlives any thread.
unsafe impl Send for PageHeap {}

impl PageHeap {
    pub const fn new(pagemap: &'static PageMap) -> Self {
        Self {
            free_lists: [const { SpanList::new() }; MAX_PAGES + 1],
            large_spans: SpanList::new(),
            pagemap,
        }
    }

    /// Allocate a span of at least `num_pages` pages.
    /// Returns a pointer to the Span, or null on failure.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access (via the enclosing `SpinMutex`).
    pub unsafe fn allocate_span(&mut self, num_pages: usize) -> *mut Span {
        assert!(num_pages > 0);

        if num_pages <= MAX_PAGES {
            for n in num_pages..=MAX_PAGES {
                if !self.free_lists[n].is_empty() {
                    let s = unsafe { self.free_lists[n].pop() };
                    return unsafe { self.carve_span(s, num_pages) };
                }
            }
        }

        let best = unsafe { self.find_best_large_span(num_pages) };
        if !best.is_null() {
            unsafe { self.large_spans.remove(best) };
            return unsafe { self.carve_span(best, num_pages) };
        }

        unsafe { self.grow_heap(num_pages) }
    }

    /// Deallocate the span starting at `addr` (which must have been returned
    /// by a prior `allocate_span` for `pages` pages). Merges iteratively with
    /// the physically-following free span only; an unrecognized address is a
    /// silent no-op.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access (via the enclosing `SpinMutex`).
    pub unsafe fn deallocate_span(&mut self, addr: *mut u8, pages: usize) {
        let page_id = (addr as usize) >> PAGE_SHIFT;
        let span = self.pagemap.get(page_id);
        if span.is_null() || unsafe { (*span).start_page } != page_id {
            return;
        }
        debug_assert_eq!(unsafe { (*span).num_pages }, pages);
        unsafe { self.free_span(span) };
    }

    /// Core of `deallocate_span`, operating on an already-resolved span
    /// rather than re-deriving it from an address. Used directly by callers
    /// (e.g. over-aligned large allocations) that carve a fresh, as-yet
    /// unregistered `Span` and want it freed without a pagemap round trip.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access; `span` must not already be free or
    /// referenced from any free list.
    pub(crate) unsafe fn free_span(&mut self, span: *mut Span) {
        unsafe { (*span).state = SpanState::Free };

        loop {
            let end_page = unsafe { (*span).end_page() };
            let succ = self.pagemap.get(end_page);
            if succ.is_null() {
                break;
            }
            let mergeable = unsafe { (*succ).state == SpanState::Free && (*succ).start_page == end_page };
            if !mergeable {
                break;
            }
            unsafe {
                let succ_pages = (*succ).num_pages;
                if succ_pages <= MAX_PAGES {
                    self.free_lists[succ_pages].remove(succ);
                } else {
                    self.large_spans.remove(succ);
                }
                (*span).num_pages += succ_pages;
                span::dealloc_span(succ);
            }
        }

        // Free spans only need first+last pages registered (for coalescing).
        unsafe { self.pagemap.register_span_endpoints(span) };
        unsafe { self.insert_free(span) };
    }

    /// Split a span: use the first `num_pages` pages, return the remainder
    /// to the free lists. Returns the (now in-use) span.
    unsafe fn carve_span(&mut self, span: *mut Span, num_pages: usize) -> *mut Span {
        let total = unsafe { (*span).num_pages };
        assert!(total >= num_pages);

        if total > num_pages {
            let remainder = span::alloc_span();
            if remainder.is_null() {
                // Can't allocate span metadata - return the whole thing
                unsafe {
                    (*span).state = SpanState::InUse;
                    self.pagemap.register_span(span);
                }
                return span;
            }

            unsafe {
                (*remainder).start_page = (*span).start_page + num_pages;
                (*remainder).num_pages = total - num_pages;
                (*remainder).state = SpanState::Free;

                (*span).num_pages = num_pages;

                self.pagemap.register_span_endpoints(remainder);
                self.insert_free(remainder);
            }
        }

        unsafe {
            (*span).state = SpanState::InUse;
            self.pagemap.register_span(span);
        }

        span
    }

    /// Insert a free span into the appropriate free list.
    unsafe fn insert_free(&mut self, span: *mut Span) {
        let n = unsafe { (*span).num_pages };
        if n <= MAX_PAGES {
            unsafe { self.free_lists[n].push(span) };
        } else {
            unsafe { self.large_spans.push(span) };
        }
    }

    /// Find the best-fit span in large_spans that has >= num_pages.
    unsafe fn find_best_large_span(&self, num_pages: usize) -> *mut Span {
        let mut best: *mut Span = ptr::null_mut();
        let mut best_pages = usize::MAX;
        let mut current = self.large_spans.head;

        while !current.is_null() {
            let n = unsafe { (*current).num_pages };
            if n >= num_pages && n < best_pages {
                best = current;
                best_pages = n;
                if n == num_pages {
                    break;
                }
            }
            current = unsafe { (*current).next };
        }
        best
    }

    /// Request pages from the OS and create a new span.
    unsafe fn grow_heap(&mut self, num_pages: usize) -> *mut Span {
        // Allocate at least 128 pages at a time to reduce OS calls.
        let alloc_pages = num_pages.max(128);
        let alloc_size = alloc_pages * PAGE_SIZE;

        let ptr = unsafe { platform::page_alloc(alloc_size) };
        if ptr.is_null() {
            if alloc_pages > num_pages {
                return unsafe { self.grow_heap_exact(num_pages) };
            }
            return ptr::null_mut();
        }

        let start_page = (ptr as usize) >> PAGE_SHIFT;

        let s = span::alloc_span();
        if s.is_null() {
            unsafe { platform::page_dealloc(ptr, alloc_size) };
            return ptr::null_mut();
        }

        unsafe {
            (*s).start_page = start_page;
            (*s).num_pages = alloc_pages;
            (*s).state = SpanState::InUse; // Will be carved immediately
        }

        unsafe { self.carve_span(s, num_pages) }
    }

    /// Fallback: allocate exactly num_pages from the OS.
    unsafe fn grow_heap_exact(&mut self, num_pages: usize) -> *mut Span {
        let alloc_size = num_pages * PAGE_SIZE;
        let ptr = unsafe { platform::page_alloc(alloc_size) };
        if ptr.is_null() {
            return ptr::null_mut();
        }

        let start_page = (ptr as usize) >> PAGE_SHIFT;

        let s = span::alloc_span();
        if s.is_null() {
            unsafe { platform::page_dealloc(ptr, alloc_size) };
            return ptr::null_mut();
        }

        unsafe {
            (*s).start_page = start_page;
            (*s).num_pages = num_pages;
            (*s).state = SpanState::InUse;
            self.pagemap.register_span(s);
        }
        s
    }
}
