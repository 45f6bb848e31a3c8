#![doc = include_str!("../README.md")]
//!
//! # Module map
//!
//! - [`cache`]: the public `Cache` facade — sharding, teardown, the
//!   fetch-through path.
//! - [`segment`]: a single shard's index, aggregate size, and the
//!   `get`/`peek`/`put`/`delete`/`delete_prefix`/shrink logic.
//! - [`list`]: the intrusive per-segment recency list.
//! - [`entry`]: the refcounted, heap-allocated record backing every
//!   cached item.
//! - [`value`]: the `CacheValue` collaborator trait.
//! - [`clock`]: the time source abstraction behind TTL expiry.
//! - [`guard`]: the RAII borrow returned by `get`/`peek`/`fetch`.
//! - [`config`]: `CacheConfig` / `InsertOptions`.
//! - [`error`]: `CacheConfigError` / `CacheError`.
//!
//! # Concurrency model
//!
//! Each segment's index and aggregate size are guarded by a
//! `parking_lot::RwLock`; its recency list is guarded by a separate
//! `parking_lot::Mutex`. At most one segment lock is ever held by a given
//! operation, since segments are disjoint. Where both a segment's rwlock
//! and its list mutex are needed, the rwlock is acquired and released
//! first; the list mutex is never held while acquiring the rwlock.
//!
//! User-supplied callbacks — [`CacheValue::on_removed`] and the `fetch`
//! loader — must not call back into the same cache. Doing so is undefined
//! behavior. Neither ever runs while a segment lock is held: the loader
//! runs before any lock is taken, and `put`'s shrink protocol defers every
//! eviction's `release` (and therefore `on_removed`) until after its
//! exclusive lock guard is dropped.

mod cache;
mod clock;
mod config;
mod entry;
mod error;
mod guard;
mod list;
mod segment;
mod value;

pub use cache::{Cache, SharedCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, InsertOptions};
pub use error::{CacheConfigError, CacheError};
pub use guard::EntryGuard;
pub use value::CacheValue;
