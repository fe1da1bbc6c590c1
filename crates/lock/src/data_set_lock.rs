//! DataSetLock: reentrant, upgradeable multi-reader/single-writer lock
//!
//! One `DataSetLock` guards one data object for its whole lifetime. The
//! design keeps many simultaneous readers cheap: only the *first* active
//! reader acquires the underlying shared stamp, later readers (from any
//! thread) just bump a counter, and the last one out releases the stamp.
//! The write side is reentrant per owning thread: the owner may nest
//! `write_lock` calls freely and must balance them with unlocks; any other
//! thread blocks until the nesting count returns to zero.
//!
//! ## Usage invariants (not enforceable here)
//!
//! - All mutation of the guarded object goes through the write lock; all
//!   external reads go through a read guard or the optimistic path. Direct
//!   access around the lock is a caller contract violation.
//! - A thread holding only the read lock must not call `write_lock`: there
//!   is no read→write upgrade, and the writer would wait for its own read
//!   stamp (self-deadlock). Release the read lock first, or take the write
//!   lock up front. (The reverse — reading while holding the write lock —
//!   is legal and free: write is stronger.)
//! - A read lock taken while holding the write lock must be released
//!   before the final write unlock.
//!
//! ## Bookkeeping
//!
//! The 0↔1 reader transitions are serialized by a small internal mutex so
//! the first-reader stamp hand-off cannot race: a reader that arrives
//! while the first one is still blocked on a writer waits on the mutex,
//! which is exactly as long as it would have to wait anyway.

use crate::stamped::{StampedLock, NO_STAMP};
use chartsync_core::error::{Error, Result};
use chartsync_core::thread_id::current_thread_id;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Reader-side bookkeeping, serialized by its mutex.
struct ReaderState {
    /// Number of outstanding logical read holds (all threads).
    count: usize,
    /// Stamp held on behalf of every active reader; `NO_STAMP` when idle.
    stamp: u64,
}

/// Reentrant, upgradeable multi-reader/single-writer lock owning its data.
///
/// `read_lock_guard` / `write_lock_guard` are the preferred API: they
/// release on every exit path, including panics inside the closure. The
/// manual `read_lock` / `write_lock` pairs exist for callers that need to
/// span a hold across scopes; unbalanced calls panic.
pub struct DataSetLock<T> {
    stamped: StampedLock,
    readers: Mutex<ReaderState>,
    /// Identity of the thread holding the write lock; 0 = none.
    writer_thread: AtomicUsize,
    /// Write nesting depth; mutated only by the owning thread (or the
    /// thread becoming/ceasing to be the owner).
    writer_count: AtomicUsize,
    /// Stamp of the held write lock; `NO_STAMP` when no writer.
    last_write_stamp: AtomicU64,
    data: UnsafeCell<T>,
}

// SAFETY: the lock protocol guarantees exclusive access for `&mut T` and
// shared access for `&T`; the raw cell is never exposed.
unsafe impl<T: Send> Send for DataSetLock<T> {}
unsafe impl<T: Send + Sync> Sync for DataSetLock<T> {}

impl<T> DataSetLock<T> {
    /// Create a lock owning `data`. One lock per data object, for the
    /// object's whole lifetime.
    pub fn new(data: T) -> Self {
        DataSetLock {
            stamped: StampedLock::new(),
            readers: Mutex::new(ReaderState {
                count: 0,
                stamp: NO_STAMP,
            }),
            writer_thread: AtomicUsize::new(0),
            writer_count: AtomicUsize::new(0),
            last_write_stamp: AtomicU64::new(NO_STAMP),
            data: UnsafeCell::new(data),
        }
    }

    /// Consume the lock and return the guarded data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// True iff the calling thread currently holds the write lock.
    pub fn holds_write_lock(&self) -> bool {
        self.writer_thread.load(Ordering::Acquire) == current_thread_id().get()
    }

    /// Number of outstanding logical read holds (diagnostic).
    ///
    /// Takes the internal reader mutex, so this blocks while a first
    /// reader is parked behind a writer. Intended for quiescent checks
    /// in tests and teardown, not for polling a contended lock.
    pub fn reader_count(&self) -> usize {
        self.readers.lock().count
    }

    /// Current write nesting depth (diagnostic).
    pub fn writer_count(&self) -> usize {
        self.writer_count.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// Acquire a logical read hold.
    ///
    /// Blocks only when this is the first active reader and a writer holds
    /// the lock. A thread that holds the write lock passes through without
    /// touching the primitive (write is stronger).
    pub fn read_lock(&self) {
        if self.holds_write_lock() {
            return;
        }
        let mut readers = self.readers.lock();
        if readers.count == 0 {
            readers.stamp = self.stamped.read_lock();
        }
        readers.count += 1;
    }

    /// Timed variant of [`read_lock`](DataSetLock::read_lock).
    ///
    /// Returns [`Error::AcquireTimeout`] if the hold could not be taken
    /// within `timeout`; no hold is outstanding after an error.
    pub fn try_read_lock_for(&self, timeout: Duration) -> Result<()> {
        if self.holds_write_lock() {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let timed_out = || Error::AcquireTimeout {
            operation: "read",
            timeout,
        };
        let mut readers = self.readers.try_lock_until(deadline).ok_or_else(timed_out)?;
        if readers.count == 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            readers.stamp = self
                .stamped
                .try_read_lock_for(remaining)
                .ok_or_else(timed_out)?;
        }
        readers.count += 1;
        Ok(())
    }

    /// Release a logical read hold; the last reader out releases the
    /// underlying stamp.
    ///
    /// # Panics
    ///
    /// Panics when called without a matching `read_lock` (unbalanced
    /// calls are a caller bug).
    pub fn read_unlock(&self) {
        if self.holds_write_lock() {
            return;
        }
        let mut readers = self.readers.lock();
        match readers.count {
            0 => panic!("read_unlock without matching read_lock"),
            1 => {
                let stamp = std::mem::replace(&mut readers.stamp, NO_STAMP);
                readers.count = 0;
                self.stamped.unlock_read(stamp);
            }
            _ => readers.count -= 1,
        }
    }

    /// Run `f` with shared access, releasing on every exit path.
    pub fn read_lock_guard<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.read_lock();
        let _release = ReadRelease(self);
        // SAFETY: a read hold (or this thread's write lock) is in force, so
        // no other thread can mutate the data until `_release` drops.
        f(unsafe { &*self.data.get() })
    }

    /// Run `f` speculatively without taking any lock, validating afterward
    /// that no write overlapped; on validation failure, fall back to a full
    /// [`read_lock_guard`](DataSetLock::read_lock_guard) and run `f` again.
    ///
    /// This avoids blocking entirely in the common no-concurrent-writer
    /// case, at the price that `f` may observe mid-mutation data (the
    /// result is then discarded) and may run twice. `f` must therefore be
    /// idempotent and free of side effects; anything else is unsafe under
    /// this mode.
    pub fn read_lock_guard_optimistic<R>(&self, f: impl Fn(&T) -> R) -> R {
        if self.holds_write_lock() {
            return self.read_lock_guard(&f);
        }
        if let Some(stamp) = self.stamped.try_optimistic_read() {
            // SAFETY: the data may be concurrently mutated during this
            // call; the result is only kept if `validate` proves no writer
            // overlapped. The cell keeps the compiler from assuming
            // immutability.
            let speculative = f(unsafe { &*self.data.get() });
            if self.stamped.validate(stamp) {
                return speculative;
            }
            trace!(
                target: "chartsync::lock",
                "optimistic read invalidated; falling back to read lock"
            );
        }
        self.read_lock_guard(&f)
    }

    // ------------------------------------------------------------------
    // Write side
    // ------------------------------------------------------------------

    /// Acquire the write lock, blocking while readers or another writer
    /// hold the lock. Reentrant: the owning thread may nest calls and must
    /// balance each with [`write_unlock`](DataSetLock::write_unlock).
    pub fn write_lock(&self) {
        let thread = current_thread_id().get();
        if self.writer_thread.load(Ordering::Acquire) == thread {
            self.writer_count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let started = Instant::now();
        let stamp = self.stamped.write_lock();
        let waited = started.elapsed();
        if waited > Duration::from_micros(100) {
            trace!(
                target: "chartsync::lock",
                waited_us = waited.as_micros() as u64,
                "contended write acquisition"
            );
        }
        self.record_write_owner(thread, stamp);
    }

    /// Timed variant of [`write_lock`](DataSetLock::write_lock).
    pub fn try_write_lock_for(&self, timeout: Duration) -> Result<()> {
        let thread = current_thread_id().get();
        if self.writer_thread.load(Ordering::Acquire) == thread {
            self.writer_count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        match self.stamped.try_write_lock_for(timeout) {
            Some(stamp) => {
                self.record_write_owner(thread, stamp);
                Ok(())
            }
            None => Err(Error::AcquireTimeout {
                operation: "write",
                timeout,
            }),
        }
    }

    /// Release one write hold; the final unlock releases the underlying
    /// stamp and clears ownership.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that does not hold the write lock.
    pub fn write_unlock(&self) {
        let thread = current_thread_id().get();
        assert!(
            self.writer_thread.load(Ordering::Acquire) == thread,
            "write_unlock from thread that does not own the write lock"
        );
        let remaining = self.writer_count.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            let stamp = self
                .last_write_stamp
                .swap(NO_STAMP, Ordering::Relaxed);
            self.writer_thread.store(0, Ordering::Release);
            self.stamped.unlock_write(stamp);
        }
    }

    /// Run `f` with exclusive access, releasing on every exit path.
    ///
    /// Manual `write_lock` nesting inside `f` is fine; nesting another
    /// `write_lock_guard` call on the *same* lock inside `f` is not (it
    /// would alias the exclusive reference) and is a caller bug.
    pub fn write_lock_guard<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.write_lock();
        let _release = WriteRelease(self);
        // SAFETY: this thread holds the write lock; no reader stamp is
        // outstanding and no other writer can enter until `_release` drops.
        f(unsafe { &mut *self.data.get() })
    }

    /// Atomically exchange the write lock for a read hold.
    ///
    /// Legal only while the calling thread holds the write lock exactly
    /// once; the caller then owns one logical read hold and must release
    /// it with [`read_unlock`](DataSetLock::read_unlock). Nested write
    /// holds are reported as [`Error::DowngradeRejected`].
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that does not hold the write lock.
    pub fn downgrade_write_lock(&self) -> Result<()> {
        let thread = current_thread_id().get();
        assert!(
            self.writer_thread.load(Ordering::Acquire) == thread,
            "downgrade from thread that does not own the write lock"
        );
        if self.writer_count.load(Ordering::Acquire) != 1 {
            return Err(Error::DowngradeRejected("nested write holds outstanding"));
        }
        let write_stamp = self
            .last_write_stamp
            .swap(NO_STAMP, Ordering::Relaxed);
        // Downgrade the primitive before touching the reader mutex: a first
        // reader that arrived while we held the write lock is parked inside
        // `stamped.read_lock` *with the mutex held*, so taking the mutex
        // while still exclusive would deadlock against it. The shared stamp
        // taken here keeps new writers out across the hand-off.
        let downgraded = self.stamped.downgrade(write_stamp);
        self.writer_count.store(0, Ordering::Release);
        self.writer_thread.store(0, Ordering::Release);
        let mut readers = self.readers.lock();
        if readers.count == 0 {
            readers.stamp = downgraded;
            readers.count = 1;
        } else {
            // A woken first reader already installed its own stamp; fold
            // our hold into the count and drop the redundant shared stamp.
            readers.count += 1;
            self.stamped.unlock_read(downgraded);
        }
        Ok(())
    }

    fn record_write_owner(&self, thread: usize, stamp: u64) {
        self.last_write_stamp.store(stamp, Ordering::Relaxed);
        self.writer_thread.store(thread, Ordering::Release);
        self.writer_count.store(1, Ordering::Release);
    }
}

impl<T> fmt::Debug for DataSetLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSetLock")
            .field("reader_count", &self.reader_count())
            .field("writer_count", &self.writer_count())
            .field("write_locked", &self.stamped.is_write_locked())
            .finish()
    }
}

/// Releases a read hold on drop (panic-safe guard body).
struct ReadRelease<'a, T>(&'a DataSetLock<T>);

impl<T> Drop for ReadRelease<'_, T> {
    fn drop(&mut self) {
        self.0.read_unlock();
    }
}

/// Releases a write hold on drop (panic-safe guard body).
struct WriteRelease<'a, T>(&'a DataSetLock<T>);

impl<T> Drop for WriteRelease<'_, T> {
    fn drop(&mut self) {
        self.0.write_unlock();
    }
}
