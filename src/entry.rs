//! The per-cached-item record.
//!
//! An `Entry<T>` is also its own recency-list node (intrusive linking): the
//! `prev`/`next` pointers live directly on the struct instead of a separate
//! allocation, the way the source's recency list is described as one
//! structure holding both the index payload and the list pointers together.
//! This halves the allocations `put` performs relative to a non-intrusive
//! list and removes a pointer indirection from every promotion.
//!
//! Entries are heap-allocated with `Box::into_raw` and freed with
//! `Box::from_raw` exactly once, when the atomic refcount transitions to
//! zero. Nothing about `Entry<T>` is safe to touch through a shared
//! reference without the discipline documented on each method; the unsafe
//! surface here is deliberately small and is the only unsafe code in the
//! crate outside [`crate::list`].

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::value::CacheValue;

/// A live cached item: key, value, expiry, weight, access bookkeeping, and
/// this segment's recency-list linkage.
///
/// `prev`/`next` are read and written only while the owning segment's
/// [`RecencyList`](crate::list::RecencyList) mutex is held; `hits` and
/// `refcount` are atomics because `hit()` runs under a shared (read) lock
/// shared by many threads, and `borrow`/`release` run outside any segment
/// lock entirely.
pub(crate) struct Entry<T: CacheValue> {
    pub(crate) key: Box<str>,
    pub(crate) value: T,
    expires_at: i64,
    pub(crate) weight: u32,
    hits: AtomicU8,
    refcount: AtomicUsize,
    prev: UnsafeCell<*mut Entry<T>>,
    next: UnsafeCell<*mut Entry<T>>,
}

// SAFETY: all access to `prev`/`next` is externally synchronized by the
// owning segment's list mutex; `hits` and `refcount` are atomics. A shared
// `&Entry<T>` never yields unsynchronized mutable access to `key`/`value`.
unsafe impl<T: CacheValue + Send> Send for Entry<T> {}
unsafe impl<T: CacheValue + Send + Sync> Sync for Entry<T> {}

impl<T: CacheValue> Entry<T> {
    /// Allocates a new entry with refcount 1 (the cache's own reference)
    /// and a detached node (`prev == next == null`).
    pub(crate) fn alloc(key: Box<str>, value: T, expires_at: i64, weight: u32) -> *mut Entry<T> {
        let entry = Entry {
            key,
            value,
            expires_at,
            weight,
            hits: AtomicU8::new(0),
            refcount: AtomicUsize::new(1),
            prev: UnsafeCell::new(ptr::null_mut()),
            next: UnsafeCell::new(ptr::null_mut()),
        };
        Box::into_raw(Box::new(entry))
    }

    /// `expires_at - now`, in seconds. Negative or zero means expired.
    pub(crate) fn ttl(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// `ttl(now) <= 0`.
    pub(crate) fn expired(&self, now: i64) -> bool {
        self.ttl(now) <= 0
    }

    /// Atomically increments the hit counter and returns the post-increment
    /// (wrapping) value.
    pub(crate) fn hit(&self) -> u8 {
        self.hits.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Atomically increments the reference count. Must be paired with
    /// exactly one [`Entry::release`].
    pub(crate) fn borrow(&self) {
        self.refcount.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns this node's `prev` pointer. Caller must hold the list mutex.
    pub(crate) fn prev(&self) -> *mut Entry<T> {
        // SAFETY: caller holds the list mutex, which is the sole
        // synchronization boundary for `prev`.
        unsafe { *self.prev.get() }
    }

    /// Returns this node's `next` pointer. Caller must hold the list mutex.
    pub(crate) fn next(&self) -> *mut Entry<T> {
        // SAFETY: see `prev`.
        unsafe { *self.next.get() }
    }

    /// Sets this node's `prev` pointer. Caller must hold the list mutex.
    pub(crate) fn set_prev(&self, p: *mut Entry<T>) {
        // SAFETY: see `prev`.
        unsafe { *self.prev.get() = p };
    }

    /// Sets this node's `next` pointer. Caller must hold the list mutex.
    pub(crate) fn set_next(&self, n: *mut Entry<T>) {
        // SAFETY: see `prev`.
        unsafe { *self.next.get() = n };
    }

    /// `true` once both `prev` and `next` are null, i.e. not linked into
    /// any recency list. Used as a destruction-time sanity check.
    fn is_detached(&self) -> bool {
        self.prev().is_null() && self.next().is_null()
    }
}

impl<T: CacheValue> Drop for Entry<T> {
    fn drop(&mut self) {
        self.value.on_removed();
    }
}

/// Atomically decrements `ptr`'s reference count; if it reached zero,
/// asserts the node is detached and destroys the entry, running the
/// value's [`CacheValue::on_removed`] hook as part of the drop.
///
/// # Safety
///
/// `ptr` must point to a live `Entry<T>` previously obtained from
/// [`Entry::alloc`] that has not already been destroyed, and the caller
/// must have a matching outstanding `borrow()` (or the implicit refcount-1
/// from allocation) to give up.
pub(crate) unsafe fn release<T: CacheValue>(ptr: *mut Entry<T>) {
    // SAFETY: caller guarantees `ptr` is live.
    let entry = unsafe { &*ptr };
    if entry.refcount.fetch_sub(1, Ordering::Release) == 1 {
        std::sync::atomic::fence(Ordering::Acquire);
        debug_assert!(
            entry.is_detached(),
            "entry destroyed while still linked into a recency list"
        );
        // SAFETY: refcount reached zero, so no other borrow can observe
        // `entry` again; we are the sole owner and free it exactly once.
        drop(unsafe { Box::from_raw(ptr) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;
    impl CacheValue for Counter {}

    #[test]
    fn new_entry_has_refcount_one_and_is_detached() {
        let ptr = Entry::alloc("k".into(), Counter, 100, 1);
        // SAFETY: just allocated, still live.
        let entry = unsafe { &*ptr };
        assert!(entry.is_detached());
        assert_eq!(entry.hit(), 1);
        assert_eq!(entry.hit(), 2);
        // SAFETY: single outstanding (implicit) reference, released once.
        unsafe { release(ptr) };
    }

    #[test]
    fn ttl_and_expired() {
        let ptr = Entry::alloc("k".into(), Counter, 100, 1);
        // SAFETY: just allocated, still live.
        let entry = unsafe { &*ptr };
        assert_eq!(entry.ttl(90), 10);
        assert!(!entry.expired(90));
        assert!(entry.expired(100));
        assert!(entry.expired(200));
        // SAFETY: single outstanding reference.
        unsafe { release(ptr) };
    }

    #[test]
    fn borrow_release_keeps_entry_alive_until_balanced() {
        struct DropFlag<'a>(&'a std::cell::Cell<bool>);
        impl CacheValue for DropFlag<'_> {
            fn on_removed(&mut self) {
                self.0.set(true);
            }
        }

        let flag = std::cell::Cell::new(false);
        let ptr = Entry::alloc("k".into(), DropFlag(&flag), 100, 1);
        // SAFETY: just allocated.
        unsafe { (*ptr).borrow() };

        // SAFETY: two outstanding references (alloc + borrow); release one.
        unsafe { release(ptr) };
        assert!(!flag.get(), "entry must survive while a borrow remains");

        // SAFETY: releasing the last reference.
        unsafe { release(ptr) };
        assert!(flag.get(), "on_removed must fire exactly when refcount hits 0");
    }

    #[test]
    #[should_panic(expected = "still linked")]
    fn release_while_linked_panics_in_debug() {
        let ptr = Entry::alloc("k".into(), Counter, 100, 1);
        // SAFETY: ptr is live; simulate being linked without going through
        // the real list, to exercise the detachment assertion.
        unsafe { (*ptr).set_prev(ptr) };
        // SAFETY: single outstanding reference; the assertion fires before
        // the entry is freed.
        unsafe { release(ptr) };
    }
}
