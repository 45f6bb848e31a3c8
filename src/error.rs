//! Error types.
//!
//! Configuration errors are returned synchronously from [`Cache::init`]
//! (crate::cache::Cache::init); everything else flows through [`CacheError`].

use thiserror::Error;

/// Errors returned by [`CacheConfig`](crate::config::CacheConfig) validation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CacheConfigError {
    /// `segment_count` was zero or not a power of two.
    #[error("segment_count must be a power of two >= 1, got {0}")]
    SegmentCountNotPow2(usize),

    /// `shrink_ratio` was outside `(0, 1]`.
    #[error("shrink_ratio must satisfy 0 < r <= 1, got {0}")]
    ShrinkRatioInvalid(f32),
}

/// Errors returned by cache operations that can fail.
///
/// Generic over `E`, the error type of a caller-supplied [`fetch`]
/// loader, so loader failures propagate with their original type instead
/// of being boxed into an opaque error.
///
/// [`fetch`]: crate::cache::Cache::fetch
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// An allocation needed by the operation could not be satisfied.
    ///
    /// Kept for API-contract fidelity with the source system, which
    /// models allocation as fallible. The global Rust allocator aborts the
    /// process on exhaustion for the infallible paths this crate uses
    /// (`Box::new`, `String`/`Box<str>` allocation), so this variant is not
    /// reachable through ordinary use; it exists so callers porting code
    /// from an allocator-fallible environment have somewhere to match it.
    #[error("allocation failed")]
    AllocFail,

    /// The loader passed to `fetch` returned an error.
    #[error(transparent)]
    Loader(#[from] E),
}
