//! The per-segment recency list.
//!
//! MRU at head, LRU at tail. Entries are intrusively linked (see
//! [`crate::entry`]) so this module only manages pointer surgery under its
//! own mutex; it never allocates, frees, or touches `hits`/`refcount`, and
//! no user callback ever runs while the mutex is held.
//!
//! This is internal infrastructure, not exposed outside the crate: it
//! hands out and consumes raw `*mut Entry<T>` pointers whose validity is
//! the caller's responsibility, same as the source's own note that its
//! list module "exposes unsafe raw pointer operations that require careful
//! invariant maintenance."

use std::ptr;

use parking_lot::Mutex;

use crate::entry::Entry;
use crate::value::CacheValue;

struct ListState<T: CacheValue> {
    head: *mut Entry<T>,
    tail: *mut Entry<T>,
    len: usize,
}

pub(crate) struct RecencyList<T: CacheValue> {
    inner: Mutex<ListState<T>>,
}

// SAFETY: all pointer manipulation happens under `inner`'s mutex.
unsafe impl<T: CacheValue + Send> Send for RecencyList<T> {}
unsafe impl<T: CacheValue + Send> Sync for RecencyList<T> {}

impl<T: CacheValue> RecencyList<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ListState {
                head: ptr::null_mut(),
                tail: ptr::null_mut(),
                len: 0,
            }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Links `node` as the new head.
    ///
    /// # Safety
    ///
    /// `node` must be a detached, live `Entry<T>` not already present in
    /// this or any other list.
    pub(crate) unsafe fn insert(&self, node: *mut Entry<T>) {
        let mut state = self.inner.lock();
        // SAFETY: caller guarantees `node` is detached and live.
        unsafe { state.attach_front(node) };
    }

    /// Moves `node` to the head. A no-op if it is already there.
    ///
    /// # Safety
    ///
    /// `node` must be a live `Entry<T>` currently linked into this list.
    pub(crate) unsafe fn move_to_front(&self, node: *mut Entry<T>) {
        let mut state = self.inner.lock();
        if state.head == node {
            return;
        }
        // SAFETY: caller guarantees `node` is linked into this list.
        unsafe {
            state.detach(node);
            state.attach_front(node);
        }
    }

    /// Moves `node` to the tail. A no-op if it is already there.
    ///
    /// # Safety
    ///
    /// `node` must be a live `Entry<T>` currently linked into this list.
    #[allow(dead_code)]
    pub(crate) unsafe fn move_to_tail(&self, node: *mut Entry<T>) {
        let mut state = self.inner.lock();
        if state.tail == node {
            return;
        }
        // SAFETY: caller guarantees `node` is linked into this list.
        unsafe {
            state.detach(node);
            state.attach_back(node);
        }
    }

    /// Removes `node` from the list. On return its `prev`/`next` are null.
    ///
    /// # Safety
    ///
    /// `node` must be a live `Entry<T>` currently linked into this list.
    pub(crate) unsafe fn unlink(&self, node: *mut Entry<T>) {
        let mut state = self.inner.lock();
        // SAFETY: caller guarantees `node` is linked into this list.
        unsafe { state.detach(node) };
    }

    /// Removes and returns the current tail, or `None` if the list is
    /// empty. The returned node's `prev`/`next` are null.
    pub(crate) fn pop_tail(&self) -> Option<*mut Entry<T>> {
        let mut state = self.inner.lock();
        let tail = state.tail;
        if tail.is_null() {
            return None;
        }
        // SAFETY: `tail` was just read from this list's own state, so it
        // is live and linked into this list.
        unsafe { state.detach(tail) };
        Some(tail)
    }
}

impl<T: CacheValue> ListState<T> {
    /// # Safety
    ///
    /// `node` must be a detached, live `Entry<T>`.
    unsafe fn attach_front(&mut self, node: *mut Entry<T>) {
        // SAFETY: caller guarantees `node` is a valid, detached entry; the
        // pointers this touches (`self.head`) are either null or valid
        // entries already linked into this same list.
        unsafe {
            (*node).set_prev(ptr::null_mut());
            (*node).set_next(self.head);
            if !self.head.is_null() {
                (*self.head).set_prev(node);
            } else {
                self.tail = node;
            }
        }
        self.head = node;
        self.len += 1;
    }

    /// # Safety
    ///
    /// `node` must be a detached, live `Entry<T>`.
    unsafe fn attach_back(&mut self, node: *mut Entry<T>) {
        // SAFETY: see `attach_front`.
        unsafe {
            (*node).set_next(ptr::null_mut());
            (*node).set_prev(self.tail);
            if !self.tail.is_null() {
                (*self.tail).set_next(node);
            } else {
                self.head = node;
            }
        }
        self.tail = node;
        self.len += 1;
    }

    /// # Safety
    ///
    /// `node` must be a live `Entry<T>` currently linked into this list.
    unsafe fn detach(&mut self, node: *mut Entry<T>) {
        // SAFETY: caller guarantees `node` is linked into this list, so
        // its neighbors (if any) are also valid entries in this list.
        let (prev, next) = unsafe { ((*node).prev(), (*node).next()) };
        if !prev.is_null() {
            // SAFETY: `prev` is a live entry in this list.
            unsafe { (*prev).set_next(next) };
        } else {
            self.head = next;
        }
        if !next.is_null() {
            // SAFETY: `next` is a live entry in this list.
            unsafe { (*next).set_prev(prev) };
        } else {
            self.tail = prev;
        }
        // SAFETY: `node` is live.
        unsafe {
            (*node).set_prev(ptr::null_mut());
            (*node).set_next(ptr::null_mut());
        }
        self.len -= 1;
    }
}
