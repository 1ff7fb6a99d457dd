//! Central Cache (middle tier): one atomic free list per size class, shared
//! across every thread.
//!
//! Each class holds a single atomic head pointer and a spinlock (the same
//! `SpinLock` the page heap's siblings use) that serializes access to it.
//! Once the lock is held the head degenerates to a plain load/store — there
//! are no other writers to race against — but the head stays an `AtomicPtr`
//! so a future lock-free reader would still observe a consistent value, and
//! a publish after a carve uses release ordering so the blocks' `next`
//! fields (written just before) are visible to whoever reads the new head.
//!
//! A span handed to this tier by the page heap is never returned to it:
//! blocks carved from it recycle within this class's free list for the
//! lifetime of the process. There is no path back, mirroring the stubbed
//! `returnToPageCache` this design is grounded on.

use crate::config::N_CLASSES;
use crate::page_heap::PageHeap;
use crate::size_class;
use crate::span::{FreeObject, SpanState};
use crate::sync::{SpinLock, SpinMutex};
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

pub struct CentralCache {
    heads: [AtomicPtr<FreeObject>; N_CLASSES],
    locks: [SpinLock; N_CLASSES],
}

impl Default for CentralCache {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: all mutable state is behind either an AtomicPtr or a SpinLock.
unsafe impl Send for CentralCache {}
unsafe impl Sync for CentralCache {}

impl CentralCache {
    pub const fn new() -> Self {
        Self {
            heads: [const { AtomicPtr::new(ptr::null_mut()) }; N_CLASSES],
            locks: [const { SpinLock::new() }; N_CLASSES],
        }
    }

    /// Fetch one free block of `class`. On an empty list, pulls a fresh span
    /// from the page heap and carves it into blocks.
    ///
    /// Returns null if `class` is empty and the page heap is out of memory.
    ///
    /// # Safety
    ///
    /// `page_heap` must be the global instance; `class` must be in range.
    pub unsafe fn fetch_range(&self, class: usize, page_heap: &SpinMutex<PageHeap>) -> *mut FreeObject {
        debug_assert!(class < N_CLASSES);
        self.locks[class].lock();

        let head = self.heads[class].load(Ordering::Relaxed);
        let result = if !head.is_null() {
            let next = unsafe { (*head).next };
            self.heads[class].store(next, Ordering::Relaxed);
            head
        } else {
            unsafe { self.populate(class, page_heap) }
        };

        self.locks[class].unlock();
        result
    }

    /// Return one free block of `class`.
    ///
    /// # Safety
    ///
    /// `addr` must be a block previously returned by `fetch_range` for the
    /// same `class`, and not already returned.
    pub unsafe fn return_range(&self, addr: *mut u8, class: usize) {
        debug_assert!(!addr.is_null());
        debug_assert!(class < N_CLASSES);

        let obj = addr as *mut FreeObject;
        self.locks[class].lock();
        let head = self.heads[class].load(Ordering::Relaxed);
        unsafe { (*obj).next = head };
        self.heads[class].store(obj, Ordering::Release);
        self.locks[class].unlock();
    }

    /// Carve a freshly-fetched span into `class`-sized blocks, publish all
    /// but the first as the new head, and return the first to the caller.
    ///
    /// Must be called with `locks[class]` held.
    unsafe fn populate(&self, class: usize, page_heap: &SpinMutex<PageHeap>) -> *mut FreeObject {
        let pages = size_class::pages_for_span(class);
        let span = unsafe { page_heap.lock().allocate_span(pages) };
        if span.is_null() {
            return ptr::null_mut();
        }
        unsafe { (*span).state = SpanState::InUse };

        let obj_size = size_class::size_of(class);
        let base = unsafe { (*span).start_addr() };
        let count = size_class::blocks_per_span(class);

        let first = base as *mut FreeObject;
        if count == 1 {
            return first;
        }

        // Thread blocks 1..count together and publish the result as the new
        // head; block 0 goes straight back to the caller without ever
        // touching the head pointer.
        let mut rest: *mut FreeObject = ptr::null_mut();
        for i in (1..count).rev() {
            let obj = unsafe { base.add(i * obj_size) } as *mut FreeObject;
            unsafe { (*obj).next = rest };
            rest = obj;
        }
        self.heads[class].store(rest, Ordering::Release);

        first
    }
}
