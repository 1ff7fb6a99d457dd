//! Thread Cache (front-end): a per-context cache of free blocks, one list
//! per size class, that satisfies hot allocations without synchronization.
//!
//! Built with `std::thread_local!` when the `std` feature is enabled (see
//! `allocator.rs`); without it, callers go straight to the central cache.

use crate::central_cache::CentralCache;
use crate::config::{N_CLASSES, THREAD_CACHE_HIGH_WATER};
use crate::page_heap::PageHeap;
use crate::span::FreeObject;
use crate::sync::SpinMutex;
use core::ptr;

/// Per-size-class free list within the thread cache. Strictly owned by the
/// thread it belongs to — no synchronization.
struct FreeList {
    head: *mut FreeObject,
    length: usize,
}

impl FreeList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            length: 0,
        }
    }

    #[inline]
    fn pop(&mut self) -> *mut FreeObject {
        let obj = self.head;
        if !obj.is_null() {
            self.head = unsafe { (*obj).next };
            self.length -= 1;
        }
        obj
    }

    #[inline]
    fn push(&mut self, obj: *mut FreeObject) {
        unsafe { (*obj).next = self.head };
        self.head = obj;
        self.length += 1;
    }
}

/// Per-context cache holding one free list per size class.
pub struct ThreadCache {
    lists: [FreeList; N_CLASSES],
}

impl Default for ThreadCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadCache {
    pub const fn new() -> Self {
        Self {
            lists: [const { FreeList::new() }; N_CLASSES],
        }
    }

    /// Allocate a block of `class`. Refills from the central cache on miss.
    ///
    /// # Safety
    ///
    /// `class` must be a valid size class index; `central` and `page_heap`
    /// must be the global instances.
    #[inline]
    pub unsafe fn allocate(
        &mut self,
        class: usize,
        central: &CentralCache,
        page_heap: &SpinMutex<PageHeap>,
    ) -> *mut u8 {
        let list = &mut self.lists[class];
        let obj = list.pop();
        if !obj.is_null() {
            return obj as *mut u8;
        }
        unsafe { central.fetch_range(class, page_heap) as *mut u8 }
    }

    /// Deallocate a block of `class`. Spills to the central cache once the
    /// list exceeds the high-water mark, draining back down to half of it.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by a prior `allocate` call for `class`.
    #[inline]
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, class: usize, central: &CentralCache) {
        let list = &mut self.lists[class];
        list.push(ptr as *mut FreeObject);

        if list.length > THREAD_CACHE_HIGH_WATER {
            let target = THREAD_CACHE_HIGH_WATER / 2;
            while list.length > target {
                let obj = list.pop();
                unsafe { central.return_range(obj as *mut u8, class) };
            }
        }
    }

    /// Drain every cached block back to the central cache. Used on thread
    /// exit so cached blocks don't become unreachable.
    ///
    /// # Safety
    ///
    /// Must only be called once per thread cache lifetime.
    pub unsafe fn flush(&mut self, central: &CentralCache) {
        for class in 0..N_CLASSES {
            let list = &mut self.lists[class];
            while !list.head.is_null() {
                let obj = list.pop();
                unsafe { central.return_range(obj as *mut u8, class) };
            }
        }
    }
}
