//! StampedLock: sequence-stamped reader/writer lock primitive
//!
//! The standard library has no stamped lock (optimistic-read validation
//! plus blocking read/write paths on one primitive), so this module builds
//! one from two pieces:
//!
//! - `parking_lot::RawRwLock` for the blocking shared/exclusive paths,
//!   timed acquisition, and atomic exclusive→shared downgrade
//! - an `AtomicU64` write generation for the optimistic protocol:
//!   even = quiescent, odd = writer active
//!
//! ## Stamp protocol
//!
//! Every acquisition returns a `u64` stamp; `0` is reserved as "no stamp".
//! The generation starts at 2, so real stamps are always nonzero:
//!
//! - a write stamp is the odd generation value entered when the exclusive
//!   lock was granted
//! - a read stamp is the (even) generation observed while the shared lock
//!   is held
//! - an optimistic stamp is the even generation observed without holding
//!   anything; [`StampedLock::validate`] succeeds iff the generation has
//!   not moved since
//!
//! The generation is bumped to odd *after* the exclusive lock is granted
//! and *before* the caller mutates anything, and back to even after the
//! caller is done, so an optimistic reader that overlaps any part of a
//! write observes either an odd generation or a changed one, and fails
//! validation.
//!
//! ## Fairness
//!
//! Whatever `parking_lot` provides (eventual fairness, not strict FIFO).
//! Callers must not assume arrival-order granting.

use lock_api::{RawRwLock as _, RawRwLockDowngrade, RawRwLockTimed};
use parking_lot::RawRwLock;
use std::fmt;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::time::Duration;

/// Reserved "no stamp held" value.
pub const NO_STAMP: u64 = 0;

/// First real generation value; keeps every stamp nonzero.
const ORIGIN: u64 = 2;

/// Sequence-stamped reader/writer lock.
///
/// See the module docs for the stamp protocol. This type has no idea of
/// reentrancy or ownership; that bookkeeping lives in
/// [`DataSetLock`](crate::DataSetLock).
pub struct StampedLock {
    raw: RawRwLock,
    /// Write generation: even = quiescent, odd = writer active.
    ///
    /// Bumped with `AcqRel`/`Release` so the odd value is visible before
    /// any mutation the writer performs, and the closing even value only
    /// after all of them.
    generation: AtomicU64,
}

impl StampedLock {
    /// Create an unlocked stamped lock.
    pub fn new() -> Self {
        StampedLock {
            raw: RawRwLock::INIT,
            generation: AtomicU64::new(ORIGIN),
        }
    }

    /// Acquire the shared (read) lock, blocking while a writer holds the
    /// exclusive lock. Returns the read stamp.
    pub fn read_lock(&self) -> u64 {
        self.raw.lock_shared();
        self.generation.load(Ordering::Acquire)
    }

    /// Try to acquire the shared lock within `timeout`. Returns the read
    /// stamp, or `None` on timeout.
    pub fn try_read_lock_for(&self, timeout: Duration) -> Option<u64> {
        if self.raw.try_lock_shared_for(timeout) {
            Some(self.generation.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Release the shared lock acquired with `stamp`.
    ///
    /// # Panics
    ///
    /// Panics if `stamp` is not a read stamp (lock-state corruption).
    pub fn unlock_read(&self, stamp: u64) {
        assert!(
            stamp != NO_STAMP && stamp % 2 == 0,
            "unlock_read with invalid stamp {stamp}"
        );
        // SAFETY: the caller's bookkeeping guarantees the shared lock is
        // held by this logical owner (checked via the stamp above).
        unsafe { self.raw.unlock_shared() };
    }

    /// Acquire the exclusive (write) lock, blocking while readers or
    /// another writer hold the lock. Returns the write stamp.
    pub fn write_lock(&self) -> u64 {
        self.raw.lock_exclusive();
        self.enter_write_generation()
    }

    /// Try to acquire the exclusive lock within `timeout`. Returns the
    /// write stamp, or `None` on timeout.
    pub fn try_write_lock_for(&self, timeout: Duration) -> Option<u64> {
        if self.raw.try_lock_exclusive_for(timeout) {
            Some(self.enter_write_generation())
        } else {
            None
        }
    }

    /// Release the exclusive lock acquired with `stamp`.
    ///
    /// # Panics
    ///
    /// Panics if `stamp` does not match the current write generation
    /// (lock-state corruption: an unlock raced or the stamp is stale).
    pub fn unlock_write(&self, stamp: u64) {
        let current = self.generation.load(Ordering::Relaxed);
        assert!(
            stamp == current && stamp % 2 == 1,
            "unlock_write stamp {stamp} does not match generation {current}"
        );
        self.generation.fetch_add(1, Ordering::Release);
        // SAFETY: the stamp check above proves this thread's bookkeeping
        // holds the exclusive lock.
        unsafe { self.raw.unlock_exclusive() };
    }

    /// Begin an optimistic read: returns the current even generation, or
    /// `None` while a writer is active.
    pub fn try_optimistic_read(&self) -> Option<u64> {
        let generation = self.generation.load(Ordering::Acquire);
        if generation % 2 == 1 {
            None
        } else {
            Some(generation)
        }
    }

    /// Validate an optimistic read: true iff no write began since `stamp`
    /// was captured.
    pub fn validate(&self, stamp: u64) -> bool {
        // The fence orders the caller's speculative data loads before the
        // generation re-read; without it the re-read could be hoisted.
        fence(Ordering::Acquire);
        self.generation.load(Ordering::Acquire) == stamp
    }

    /// Atomically convert the exclusive lock into a shared one.
    ///
    /// The write identified by `write_stamp` is sealed (generation bumped
    /// to even) and the shared lock is held on return; no other writer can
    /// slip in between. Returns the new read stamp.
    ///
    /// # Panics
    ///
    /// Panics if `write_stamp` does not match the current write generation.
    pub fn downgrade(&self, write_stamp: u64) -> u64 {
        let current = self.generation.load(Ordering::Relaxed);
        assert!(
            write_stamp == current && write_stamp % 2 == 1,
            "downgrade stamp {write_stamp} does not match generation {current}"
        );
        let read_stamp = self.generation.fetch_add(1, Ordering::Release) + 1;
        // SAFETY: the stamp check above proves the exclusive lock is held.
        unsafe { self.raw.downgrade() };
        read_stamp
    }

    /// True while a writer holds the exclusive lock.
    pub fn is_write_locked(&self) -> bool {
        self.generation.load(Ordering::Acquire) % 2 == 1
    }

    /// Bump the generation to odd after an exclusive grant.
    fn enter_write_generation(&self) -> u64 {
        // AcqRel: the odd value must be published before the caller's
        // mutations become visible to optimistic readers.
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for StampedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StampedLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StampedLock")
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("write_locked", &self.is_write_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_read_stamp_is_even_and_nonzero() {
        let lock = StampedLock::new();
        let stamp = lock.read_lock();
        assert_ne!(stamp, NO_STAMP);
        assert_eq!(stamp % 2, 0);
        lock.unlock_read(stamp);
    }

    #[test]
    fn test_write_stamp_is_odd() {
        let lock = StampedLock::new();
        let stamp = lock.write_lock();
        assert_eq!(stamp % 2, 1);
        assert!(lock.is_write_locked());
        lock.unlock_write(stamp);
        assert!(!lock.is_write_locked());
    }

    #[test]
    fn test_optimistic_read_validates_when_quiescent() {
        let lock = StampedLock::new();
        let stamp = lock.try_optimistic_read().unwrap();
        assert!(lock.validate(stamp));
    }

    #[test]
    fn test_optimistic_read_fails_across_a_write() {
        let lock = StampedLock::new();
        let stamp = lock.try_optimistic_read().unwrap();
        let write = lock.write_lock();
        lock.unlock_write(write);
        assert!(!lock.validate(stamp));
    }

    #[test]
    fn test_optimistic_read_unavailable_while_write_held() {
        let lock = StampedLock::new();
        let write = lock.write_lock();
        assert!(lock.try_optimistic_read().is_none());
        lock.unlock_write(write);
    }

    #[test]
    fn test_timed_write_times_out_against_reader() {
        let lock = Arc::new(StampedLock::new());
        let read = lock.read_lock();
        assert!(lock
            .try_write_lock_for(Duration::from_millis(20))
            .is_none());
        lock.unlock_read(read);
        let write = lock.try_write_lock_for(Duration::from_millis(100)).unwrap();
        lock.unlock_write(write);
    }

    #[test]
    fn test_timed_read_times_out_against_writer() {
        let lock = StampedLock::new();
        let write = lock.write_lock();
        assert!(lock.try_read_lock_for(Duration::from_millis(20)).is_none());
        lock.unlock_write(write);
    }

    #[test]
    fn test_downgrade_blocks_new_writers_until_read_released() {
        let lock = Arc::new(StampedLock::new());
        let write = lock.write_lock();
        let read = lock.downgrade(write);
        assert!(!lock.is_write_locked());
        // A second writer cannot get in while the downgraded read is held.
        assert!(lock
            .try_write_lock_for(Duration::from_millis(20))
            .is_none());
        lock.unlock_read(read);
        let write = lock.try_write_lock_for(Duration::from_millis(100)).unwrap();
        lock.unlock_write(write);
    }

    #[test]
    #[should_panic(expected = "does not match generation")]
    fn test_unlock_write_with_stale_stamp_panics() {
        let lock = StampedLock::new();
        let first = lock.write_lock();
        lock.unlock_write(first);
        let second = lock.write_lock();
        let _ = second;
        lock.unlock_write(first);
    }

    proptest::proptest! {
        /// An optimistic stamp stays valid iff no write cycle ran since
        /// it was captured.
        #[test]
        fn prop_validation_fails_after_any_write(cycles in 0usize..32) {
            let lock = StampedLock::new();
            let stamp = lock.try_optimistic_read().unwrap();
            for _ in 0..cycles {
                let write = lock.write_lock();
                lock.unlock_write(write);
            }
            proptest::prop_assert_eq!(lock.validate(stamp), cycles == 0);
        }
    }

    #[test]
    fn test_writer_blocks_until_readers_drain() {
        let lock = Arc::new(StampedLock::new());
        let read = lock.read_lock();
        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let stamp = lock.write_lock();
                lock.unlock_write(stamp);
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!writer.is_finished());
        lock.unlock_read(read);
        writer.join().unwrap();
    }
}
