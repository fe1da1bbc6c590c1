//! Stable per-thread identity
//!
//! The reentrant write path needs to answer "is the calling thread the one
//! that already owns the write lock?" with a cheap, stable comparison. We
//! use the same mechanism `lock_api`'s own `ReentrantMutex` uses:
//! `parking_lot::RawThreadId`, which derives a nonzero address-based id from
//! a thread-local. The id is stable for the lifetime of the thread and never
//! zero, so `0` is free to act as the "no owner" sentinel in atomics.

use lock_api::GetThreadId;
use parking_lot::RawThreadId;
use std::num::NonZeroUsize;

/// Returns the calling thread's stable nonzero identity.
///
/// Two calls from the same thread always return the same value; calls from
/// different live threads never collide.
#[inline]
pub fn current_thread_id() -> NonZeroUsize {
    RawThreadId::INIT.nonzero_thread_id()
}
