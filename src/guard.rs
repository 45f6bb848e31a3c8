//! RAII wrapper around a borrowed entry.
//!
//! Every read path (`get`, `peek`, `fetch`) hands callers an [`EntryGuard`]
//! rather than a raw reference into the segment: the guard owns a
//! `borrow()` taken while the segment lock was held, and releases it on
//! drop. Callers can keep the guard around after the lock is gone without
//! risking a use-after-free from a concurrent eviction.

use std::fmt;
use std::ops::Deref;

use crate::entry::{self, Entry};
use crate::value::CacheValue;

/// A borrowed handle to a cached value.
///
/// Dereferences to `&T`. Dropping the guard releases the entry's
/// reference count; it does not remove the entry from the cache, which
/// may happen concurrently via eviction or `delete`.
pub struct EntryGuard<T: CacheValue> {
    ptr: *mut Entry<T>,
}

impl<T: CacheValue> EntryGuard<T> {
    /// Wraps an already-borrowed entry pointer. The caller transfers
    /// ownership of one outstanding `borrow()` to the returned guard.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `Entry<T>` with a `borrow()` taken for
    /// this guard to release exactly once.
    pub(crate) unsafe fn new(ptr: *mut Entry<T>) -> Self {
        Self { ptr }
    }
}

impl<T: CacheValue> Deref for EntryGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds a live borrow for its entire lifetime.
        unsafe { &(*self.ptr).value }
    }
}

impl<T: CacheValue> Drop for EntryGuard<T> {
    fn drop(&mut self) {
        // SAFETY: this guard owns exactly one outstanding borrow, taken in
        // `new` and not yet released.
        unsafe { entry::release(self.ptr) };
    }
}

impl<T: CacheValue + fmt::Debug> fmt::Debug for EntryGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// SAFETY: the guard's only access to `Entry<T>` is through `&T` via
// `Deref`, gated by the same rules as `Entry<T>` itself.
unsafe impl<T: CacheValue + Send> Send for EntryGuard<T> {}
unsafe impl<T: CacheValue + Sync> Sync for EntryGuard<T> {}
