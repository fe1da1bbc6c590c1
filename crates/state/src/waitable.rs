//! WaitableBitState: a parkable aggregate dirty state
//!
//! The event-processing loop needs one root state that every tracked
//! object's `BitState` feeds into, and a way to block until that root turns
//! dirty. `WaitableBitState` pairs a `BitState` with a monitor mutex and
//! condvar: `set` mutates the bits *inside* the monitor and notifies, and
//! the waiter re-checks the bits while holding the monitor before parking,
//! so a setter's wake-up can never land between the waiter's check and its
//! park (no lost wake-ups).
//!
//! It also implements [`StateListener`], so an `Arc<WaitableBitState>` can
//! be registered directly as the invalidate listener of any number of
//! per-object states.

use crate::bit_state::{BitState, StateListener};
use chartsync_core::bits::StateBits;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

/// A `BitState` that threads can park on until it turns dirty.
pub struct WaitableBitState {
    inner: BitState,
    /// Monitor serializing set-vs-wait; guards no data of its own.
    monitor: Mutex<()>,
    on_dirty: Condvar,
}

impl WaitableBitState {
    /// Create a clean waitable state.
    pub fn new(source: impl Into<String>) -> Self {
        WaitableBitState {
            inner: BitState::new(source),
            monitor: Mutex::new(()),
            on_dirty: Condvar::new(),
        }
    }

    /// The underlying `BitState` (for listener registration or queries).
    pub fn bit_state(&self) -> &BitState {
        &self.inner
    }

    /// Current dirty bits.
    pub fn bits(&self) -> StateBits {
        self.inner.bits()
    }

    /// True iff any bit is set.
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    /// OR bits into the state and wake every parked waiter.
    ///
    /// The mutation happens inside the monitor, so a concurrent
    /// [`wait_while_clean`] either observes the new bits or is parked and
    /// receives the notification; the wake-up cannot be lost.
    ///
    /// [`wait_while_clean`]: WaitableBitState::wait_while_clean
    pub fn set(&self, bits: StateBits) {
        let _guard = self.monitor.lock();
        self.inner.set(bits);
        self.on_dirty.notify_all();
    }

    /// Atomically snapshot the dirty bits and clear them.
    ///
    /// This is the worker's drain step: the returned bits are exactly the
    /// ones this call removed, so no concurrent `set` is double-counted or
    /// lost.
    pub fn snapshot_and_clear(&self) -> StateBits {
        self.inner.clear()
    }

    /// Block the calling thread until the state is dirty; returns the bits
    /// observed (never zero).
    pub fn wait_while_clean(&self) -> StateBits {
        let mut guard = self.monitor.lock();
        loop {
            let bits = self.inner.bits();
            if bits != 0 {
                return bits;
            }
            self.on_dirty.wait(&mut guard);
        }
    }

    /// Block until the state is dirty or `timeout` elapses; returns the
    /// bits observed (zero on timeout with a still-clean state).
    pub fn wait_while_clean_for(&self, timeout: Duration) -> StateBits {
        let deadline = Instant::now() + timeout;
        let mut guard = self.monitor.lock();
        loop {
            let bits = self.inner.bits();
            if bits != 0 {
                return bits;
            }
            if self.on_dirty.wait_until(&mut guard, deadline).timed_out() {
                return self.inner.bits();
            }
        }
    }
}

impl StateListener for WaitableBitState {
    fn on_bits(&self, bits: StateBits) {
        self.set(bits);
    }
}

impl fmt::Debug for WaitableBitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitableBitState")
            .field("inner", &self.inner)
            .finish()
    }
}
