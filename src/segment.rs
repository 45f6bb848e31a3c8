//! A single shard: an index, an aggregate size, and a recency list.
//!
//! Every per-key operation a [`Cache`](crate::cache::Cache) exposes routes
//! through exactly one `Segment`, chosen by hashing the key. Segments are
//! disjoint, so at most one segment's lock is ever held by a given
//! operation; the segment's `RwLock` is always acquired before its
//! [`RecencyList`]'s mutex, and the two are never held across each other in
//! reverse (see the crate-level concurrency notes).

use std::hash::BuildHasher;

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::entry::{self, Entry};
use crate::list::RecencyList;
use crate::value::CacheValue;

struct SegmentState<T: CacheValue, S> {
    index: HashMap<Box<str>, *mut Entry<T>, S>,
    size: u64,
}

pub(crate) struct Segment<T: CacheValue, S> {
    state: RwLock<SegmentState<T, S>>,
    list: RecencyList<T>,
    max_size: u64,
    target_size: u64,
    gets_per_promote: u8,
}

// SAFETY: every `*mut Entry<T>` reachable from `state`/`list` is reachable
// only through `&self` methods that route pointer access through the
// segment's own lock or the list's own mutex.
unsafe impl<T: CacheValue + Send, S: Send> Send for Segment<T, S> {}
unsafe impl<T: CacheValue + Send + Sync, S: Send + Sync> Sync for Segment<T, S> {}

impl<T: CacheValue, S: BuildHasher + Default> Segment<T, S> {
    pub(crate) fn new(max_size: u64, target_size: u64, gets_per_promote: u8) -> Self {
        Self {
            state: RwLock::new(SegmentState {
                index: HashMap::with_hasher(S::default()),
                size: 0,
            }),
            list: RecencyList::new(),
            max_size,
            target_size,
            gets_per_promote,
        }
    }
}

impl<T: CacheValue, S: BuildHasher> Segment<T, S> {
    pub(crate) fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.state.read().index.contains_key(key)
    }

    /// Promotes `ptr` to the head of the recency list if this hit lands on
    /// a promotion boundary. `gets_per_promote == 0` disables promotion
    /// entirely rather than panicking on the modulus.
    fn maybe_promote(&self, ptr: *mut Entry<T>, hits: u8) {
        if self.gets_per_promote != 0 && hits % self.gets_per_promote == 0 {
            // SAFETY: `ptr` is linked into this segment's list; it was
            // either looked up from the index (still linked) or just
            // inserted by `put`.
            unsafe { self.list.move_to_front(ptr) };
        }
    }

    /// Removes `key` from the index iff it still maps to `ptr`, and
    /// updates `size` accordingly. Returns whether the removal happened.
    fn remove_if_current(&self, key: &str, ptr: *mut Entry<T>) -> bool {
        let mut state = self.state.write();
        match state.index.get(key) {
            Some(&current) if current == ptr => {
                state.index.remove(key);
                // SAFETY: `ptr` is still live; its `weight` field is set
                // once at `alloc` and never mutated.
                state.size -= unsafe { (*ptr).weight as u64 };
                true
            }
            _ => false,
        }
    }

    /// The active-read path: removes the entry if found expired.
    ///
    /// # Safety
    ///
    /// Same pointer-validity contract as the rest of this module: returned
    /// pointers carry one outstanding `borrow()` the caller must release.
    pub(crate) fn get(&self, key: &str, clock: &dyn Clock) -> Option<*mut Entry<T>> {
        let ptr = {
            let state = self.state.read();
            let ptr = *state.index.get(key)?;
            // SAFETY: `ptr` is live while `state`'s read lock is held.
            unsafe { (*ptr).borrow() };
            ptr
        };

        let now = clock.now();
        // SAFETY: we hold a borrow taken above.
        if unsafe { (*ptr).expired(now) } {
            // SAFETY: releasing the temporary borrow taken above.
            unsafe { entry::release(ptr) };
            if self.remove_if_current(key, ptr) {
                // SAFETY: `ptr` was just unindexed by us; still linked.
                unsafe {
                    self.list.unlink(ptr);
                    entry::release(ptr);
                }
            }
            return None;
        }

        // SAFETY: `ptr` is live; we hold a borrow.
        let hits = unsafe { (*ptr).hit() };
        self.maybe_promote(ptr, hits);
        Some(ptr)
    }

    /// `peek` — does not remove expired entries, and never promotes one.
    pub(crate) fn peek(&self, key: &str, clock: &dyn Clock) -> Option<*mut Entry<T>> {
        let ptr = {
            let state = self.state.read();
            let ptr = *state.index.get(key)?;
            // SAFETY: `ptr` is live while `state`'s read lock is held.
            unsafe { (*ptr).borrow() };
            ptr
        };

        let now = clock.now();
        // SAFETY: we hold a borrow taken above.
        if !unsafe { (*ptr).expired(now) } {
            let hits = unsafe { (*ptr).hit() };
            self.maybe_promote(ptr, hits);
        }
        Some(ptr)
    }

    pub(crate) fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            match state.index.remove(key) {
                Some(ptr) => {
                    // SAFETY: `weight` is immutable after `alloc`.
                    state.size -= unsafe { (*ptr).weight as u64 };
                    Some(ptr)
                }
                None => None,
            }
        };
        let Some(ptr) = removed else {
            return false;
        };
        // SAFETY: `ptr` was just unindexed by us, and is still linked.
        unsafe {
            self.list.unlink(ptr);
            entry::release(ptr);
        }
        true
    }

    /// Two-phase prefix scan (§4.3): a shared-lock pass to collect
    /// candidates, then an exclusive-lock pass that removes a key only if
    /// it still points at the entry observed in the first pass.
    pub(crate) fn delete_prefix(&self, prefix: &str) -> usize {
        let candidates: Vec<(Box<str>, *mut Entry<T>)> = {
            let state = self.state.read();
            state
                .index
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, &v)| (k.clone(), v))
                .collect()
        };
        if candidates.is_empty() {
            return 0;
        }

        let mut removed = Vec::with_capacity(candidates.len());
        {
            let mut state = self.state.write();
            for (key, ptr) in &candidates {
                if let Some(&current) = state.index.get(key.as_ref()) {
                    if current == *ptr {
                        state.index.remove(key.as_ref());
                        // SAFETY: `weight` is immutable after `alloc`.
                        state.size -= unsafe { (*ptr).weight as u64 };
                        removed.push(*ptr);
                    }
                }
            }
        }

        for ptr in &removed {
            // SAFETY: each `ptr` was just unindexed by us, still linked.
            unsafe {
                self.list.unlink(*ptr);
                entry::release(*ptr);
            }
        }
        removed.len()
    }

    /// Inserts or replaces `key`, running the shrink protocol if the
    /// segment is over `max_size` afterward. Returns the new entry with
    /// one outstanding borrow for the caller.
    pub(crate) fn put(
        &self,
        key: Box<str>,
        value: T,
        ttl: i64,
        requested_weight: u32,
        clock: &dyn Clock,
    ) -> *mut Entry<T> {
        let expires_at = clock.now() + ttl;
        let weight = value.weight(requested_weight);
        let new_ptr = Entry::alloc(key.clone(), value, expires_at, weight);

        let (displaced, size_after) = {
            let mut state = self.state.write();
            let displaced = state.index.insert(key, new_ptr);
            match displaced {
                Some(old) => {
                    // SAFETY: `old` was the previous occupant; its weight
                    // field is immutable.
                    state.size = state.size - unsafe { (*old).weight as u64 } + weight as u64;
                }
                None => {
                    state.size += weight as u64;
                }
            }
            (displaced, state.size)
        };

        if let Some(old) = displaced {
            // SAFETY: `old` is no longer indexed, was linked into the
            // list (every indexed entry is), and we hold the cache's
            // reference to it.
            unsafe {
                self.list.unlink(old);
                entry::release(old);
            }
        }

        // SAFETY: `new_ptr` is fresh and detached.
        unsafe { self.list.insert(new_ptr) };

        // Taken before `shrink()` runs: `new_ptr` may itself be the lone
        // entry on the list (a weight exceeding `max_size`) and so may be
        // the one `shrink` pops and releases. Borrowing first brings its
        // refcount to 2, so that release only brings it back to 1
        // instead of 0; the entry survives, possibly already evicted
        // from the index, until the caller releases this borrow.
        // SAFETY: `new_ptr` carries the cache's reference from `alloc`;
        // this second borrow is the one handed to the caller.
        unsafe { (*new_ptr).borrow() };

        if size_after > self.max_size {
            self.shrink();
        }

        new_ptr
    }

    fn shrink(&self) {
        let mut evicted: Vec<*mut Entry<T>> = Vec::new();
        {
            let mut state = self.state.write();
            while state.size > self.target_size {
                let Some(tail) = self.list.pop_tail() else {
                    break;
                };
                // SAFETY: `tail` came from this segment's own list, whose
                // membership mirrors `state.index`.
                let removed = unsafe { state.index.remove((*tail).key.as_ref()) };
                debug_assert!(removed.is_some(), "list tail missing from index");
                // SAFETY: `weight` is immutable after `alloc`.
                state.size -= unsafe { (*tail).weight as u64 };
                evicted.push(tail);
            }
        }
        if !evicted.is_empty() {
            trace!(count = evicted.len(), "segment shrink evicted entries");
        }
        for ptr in evicted {
            // SAFETY: each `ptr` was popped from the list (so already
            // detached) and removed from the index above.
            unsafe { entry::release(ptr) };
        }
    }

    /// Drops every entry still held by this segment, running each value's
    /// destruction hook exactly once. Called from `Cache`'s `Drop` impl.
    pub(crate) fn teardown(&mut self) {
        let state = self.state.get_mut();
        let mut count = 0usize;
        for (_, ptr) in state.index.drain() {
            // SAFETY: the segment is being torn down; no concurrent
            // access is possible (`&mut self`).
            unsafe {
                self.list.unlink(ptr);
                entry::release(ptr);
            }
            count += 1;
        }
        state.size = 0;
        if count > 0 {
            debug!(count, "segment teardown released entries");
        }
    }
}
