//! The public, sharded, thread-safe cache facade.

use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

use ahash::RandomState;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::{CacheConfig, InsertOptions};
use crate::entry;
use crate::error::{CacheConfigError, CacheError};
use crate::guard::EntryGuard;
use crate::segment::Segment;
use crate::value::CacheValue;

/// A sharded, expiration-aware, thread-safe cache.
///
/// Keys are distributed across `segment_count` independent [`Segment`]s by
/// hash, each guarded by its own lock; see the crate-level documentation
/// for the concurrency and eviction model.
pub struct Cache<T: CacheValue, C: Clock = SystemClock, S: BuildHasher = RandomState> {
    segments: Box<[Segment<T, S>]>,
    hash_builder: S,
    clock: C,
    segment_max_size: u64,
    segment_count: usize,
}

impl<T: CacheValue + fmt::Debug, C: Clock + fmt::Debug, S: BuildHasher> fmt::Debug
    for Cache<T, C, S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("segment_count", &self.segment_count)
            .field("segment_max_size", &self.segment_max_size)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl<T: CacheValue> Cache<T, SystemClock, RandomState> {
    /// Builds a cache from `config`, using the real wall clock and
    /// `ahash`'s `RandomState` for segment selection.
    ///
    /// # Errors
    ///
    /// Returns [`CacheConfigError::SegmentCountNotPow2`] if
    /// `config.segment_count` is zero or not a power of two, or
    /// [`CacheConfigError::ShrinkRatioInvalid`] if `config.shrink_ratio` is
    /// outside `(0, 1]`.
    pub fn init(config: CacheConfig) -> Result<Self, CacheConfigError> {
        Self::init_with(config, SystemClock, RandomState::default())
    }
}

impl<T: CacheValue, C: Clock, S: BuildHasher + Clone + Default> Cache<T, C, S> {
    /// Builds a cache from `config` with a caller-supplied [`Clock`] and
    /// hash builder. Use this to inject a [`crate::clock::ManualClock`]
    /// for deterministic TTL tests, or a custom hasher.
    ///
    /// # Errors
    ///
    /// Same as [`Cache::init`].
    pub fn init_with(config: CacheConfig, clock: C, hash_builder: S) -> Result<Self, CacheConfigError> {
        if config.segment_count == 0 || !config.segment_count.is_power_of_two() {
            return Err(CacheConfigError::SegmentCountNotPow2(config.segment_count));
        }
        if !(config.shrink_ratio > 0.0 && config.shrink_ratio <= 1.0) {
            return Err(CacheConfigError::ShrinkRatioInvalid(config.shrink_ratio));
        }

        let segment_max_size = (config.max_size as u64) / (config.segment_count as u64);
        let shrink_amount = (segment_max_size as f64 * config.shrink_ratio as f64) as u64;
        let target_size = segment_max_size - shrink_amount;

        let segments = (0..config.segment_count)
            .map(|_| Segment::new(segment_max_size, target_size, config.gets_per_promote))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        debug!(
            segment_count = config.segment_count,
            segment_max_size, target_size, "cache initialized"
        );

        Ok(Self {
            segments,
            hash_builder,
            clock,
            segment_max_size,
            segment_count: config.segment_count,
        })
    }
}

impl<T: CacheValue, C: Clock, S: BuildHasher> Cache<T, C, S> {
    #[inline]
    fn segment_for(&self, key: &str) -> &Segment<T, S> {
        let hash = self.hash_builder.hash_one(key);
        let index = (hash as usize) & (self.segment_count - 1);
        &self.segments[index]
    }

    /// Returns `true` if `key` is present, irrespective of expiry.
    pub fn contains(&self, key: &str) -> bool {
        self.segment_for(key).contains(key)
    }

    /// Looks up `key`, removing it if it has expired.
    pub fn get(&self, key: &str) -> Option<EntryGuard<T>> {
        let ptr = self.segment_for(key).get(key, &self.clock)?;
        // SAFETY: `ptr` carries exactly one outstanding borrow, taken by
        // `Segment::get` for this caller.
        Some(unsafe { EntryGuard::new(ptr) })
    }

    /// Looks up `key` without evicting it even if expired.
    pub fn peek(&self, key: &str) -> Option<EntryGuard<T>> {
        let ptr = self.segment_for(key).peek(key, &self.clock)?;
        // SAFETY: `ptr` carries exactly one outstanding borrow, taken by
        // `Segment::peek` for this caller.
        Some(unsafe { EntryGuard::new(ptr) })
    }

    /// Inserts `value` under `key`, applying `opts.ttl` and, if `T` has no
    /// weight override, `opts.size`. Replaces any existing mapping.
    pub fn put(&self, key: &str, value: T, opts: InsertOptions) {
        let ptr = self
            .segment_for(key)
            .put(key.into(), value, opts.ttl, opts.size, &self.clock);
        // SAFETY: `put` hands back one borrow for the caller; this call
        // discards it immediately since `put` returns nothing to the user.
        unsafe { entry::release(ptr) };
    }

    /// Removes `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.segment_for(key).delete(key)
    }

    /// Removes every key starting with `prefix`, across all segments.
    /// Returns the number of keys removed.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        self.segments.iter().map(|s| s.delete_prefix(prefix)).sum()
    }

    /// Looks up `key`; on a miss, invokes `loader(key)` and caches its
    /// result. Returns `None` if the loader reports no value. Propagates
    /// the loader's error verbatim, without mutating the cache.
    ///
    /// No thundering-herd suppression: concurrent `fetch` calls for the
    /// same missing key may each invoke `loader`; the last `put` wins.
    pub fn fetch<E>(
        &self,
        key: &str,
        opts: InsertOptions,
        loader: impl FnOnce(&str) -> Result<Option<T>, E>,
    ) -> Result<Option<EntryGuard<T>>, CacheError<E>> {
        if let Some(hit) = self.get(key) {
            return Ok(Some(hit));
        }
        match loader(key)? {
            Some(value) => {
                let ptr = self
                    .segment_for(key)
                    .put(key.into(), value, opts.ttl, opts.size, &self.clock);
                // SAFETY: `put` hands back one borrow for this caller.
                Ok(Some(unsafe { EntryGuard::new(ptr) }))
            }
            None => Ok(None),
        }
    }

    /// The aggregate weight budget actually in effect, which may be less
    /// than `config.max_size` due to floor division across segments.
    pub fn max_size_effective(&self) -> u64 {
        self.segment_max_size * self.segment_count as u64
    }

    /// Total entry count across all segments. Acquires each segment's
    /// lock in turn; the result may be stale under concurrent writers.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// `true` if every segment is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: CacheValue, C: Clock, S: BuildHasher> Drop for Cache<T, C, S> {
    fn drop(&mut self) {
        for segment in self.segments.iter_mut() {
            segment.teardown();
        }
    }
}

/// A thread-safe handle: clone and share a `Cache` across threads via
/// `Arc` directly, since every method above takes `&self`. This alias
/// documents the intended sharing idiom without adding any behavior.
pub type SharedCache<T, C = SystemClock, S = RandomState> = Arc<Cache<T, C, S>>;
