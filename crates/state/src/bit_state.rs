//! BitState: an atomic dirty bitmask with listeners
//!
//! Each data object owns one `BitState`. Mutators OR bits into it after a
//! change; two listener lists fan the signal out:
//!
//! - **Change listeners** fire only for bits that transitioned 0→1, and
//!   receive exactly that delta.
//! - **Invalidate listeners** fire on *every* `set` call that delivers at
//!   least one accepted bit, whether or not the bit was already set.
//!   "Invalidate" means "this happened again", not "this is newly true".
//!
//! Within one `set` call the change list runs first, then the invalidate
//! list; each list runs in registration order.
//!
//! ## Thread safety
//!
//! The bitmask itself is an `AtomicU64`, so `set`/`clear`/`is_dirty` are
//! safe from any thread. Listeners run synchronously on the thread that
//! called `set`; the listener lists are snapshotted before notification, so
//! a listener may add or remove registrations on the same instance without
//! deadlocking (the change is seen by the *next* `set`).

use chartsync_core::bits::{intersects, StateBits, ALL_BITS};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A listener invoked with the dirty bits relevant to its registration.
///
/// The bits argument is never zero: registrations whose filter does not
/// intersect the event are skipped entirely.
pub trait StateListener: Send + Sync {
    /// Called with the (filtered) dirty bits of one notification.
    fn on_bits(&self, bits: StateBits);
}

impl<F> StateListener for F
where
    F: Fn(StateBits) + Send + Sync,
{
    fn on_bits(&self, bits: StateBits) {
        self(bits)
    }
}

/// A listener registration: either unfiltered or wrapped with a sub-mask.
///
/// Removal matches by listener identity through one level of unwrapping, so
/// a filtered registration is removed with the same `Arc` that was passed
/// to the filtered add method.
enum Registration {
    Unfiltered(Arc<dyn StateListener>),
    Filtered {
        mask: StateBits,
        inner: Arc<dyn StateListener>,
    },
}

impl Registration {
    fn inner(&self) -> &Arc<dyn StateListener> {
        match self {
            Registration::Unfiltered(inner) => inner,
            Registration::Filtered { inner, .. } => inner,
        }
    }

    fn mask(&self) -> StateBits {
        match self {
            Registration::Unfiltered(_) => ALL_BITS,
            Registration::Filtered { mask, .. } => *mask,
        }
    }

    fn matches(&self, listener: &Arc<dyn StateListener>) -> bool {
        Arc::ptr_eq(self.inner(), listener)
    }
}

impl Clone for Registration {
    fn clone(&self) -> Self {
        match self {
            Registration::Unfiltered(inner) => Registration::Unfiltered(Arc::clone(inner)),
            Registration::Filtered { mask, inner } => Registration::Filtered {
                mask: *mask,
                inner: Arc::clone(inner),
            },
        }
    }
}

/// Atomic dirty bitmask with change and invalidate listeners.
///
/// Bits outside the instance filter are never stored and never delivered.
/// The meaning of individual bits belongs to the consuming layer; this type
/// treats the mask as opaque.
pub struct BitState {
    /// Current dirty bits. Only bits inside `filter` can be set.
    state: AtomicU64,
    /// Bits this instance accepts. Defaults to accept-all.
    filter: StateBits,
    /// Diagnostic label of the owning object.
    source: String,
    /// Notified with the 0→1 delta only.
    change_listeners: RwLock<Vec<Registration>>,
    /// Notified on every accepted `set`.
    invalidate_listeners: RwLock<Vec<Registration>>,
}

impl BitState {
    /// Create a clean state that accepts every bit.
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_filter(source, ALL_BITS)
    }

    /// Create a clean state that accepts only bits inside `filter`.
    pub fn with_filter(source: impl Into<String>, filter: StateBits) -> Self {
        BitState {
            state: AtomicU64::new(0),
            filter,
            source: source.into(),
            change_listeners: RwLock::new(Vec::new()),
            invalidate_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Create an initially-dirty state (the common owner pattern: a freshly
    /// constructed object is dirty in every respect it tracks).
    ///
    /// No listeners exist yet at construction, so no notification fires.
    pub fn dirty(source: impl Into<String>, bits: StateBits) -> Self {
        let state = Self::new(source);
        state.state.store(bits & state.filter, Ordering::Relaxed);
        state
    }

    /// Diagnostic label of the owning object.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The accept-filter of this instance.
    pub fn filter(&self) -> StateBits {
        self.filter
    }

    /// Current dirty bits.
    pub fn bits(&self) -> StateBits {
        self.state.load(Ordering::Acquire)
    }

    /// OR `bits & filter` into the state and notify listeners.
    ///
    /// Change listeners receive the bits that transitioned 0→1 (skipped
    /// entirely when nothing newly transitioned); invalidate listeners
    /// receive the full accepted bits on every call. Listeners run
    /// synchronously on the calling thread.
    pub fn set(&self, bits: StateBits) {
        let accepted = bits & self.filter;
        if accepted == 0 {
            return;
        }
        let previous = self.state.fetch_or(accepted, Ordering::AcqRel);
        let delta = accepted & !previous;
        if delta != 0 {
            Self::notify(&self.change_listeners, delta);
        }
        Self::notify(&self.invalidate_listeners, accepted);
    }

    /// Clear every bit; returns the bits that were dirty.
    pub fn clear(&self) -> StateBits {
        self.state.swap(0, Ordering::AcqRel)
    }

    /// Clear only `mask` bits; returns the new state.
    pub fn clear_bits(&self, mask: StateBits) -> StateBits {
        self.state.fetch_and(!mask, Ordering::AcqRel) & !mask
    }

    /// True iff any bit is set.
    pub fn is_dirty(&self) -> bool {
        self.bits() != 0
    }

    /// True iff at least one bit inside `mask` is set.
    ///
    /// Polarity matters: "dirty under a mask" means *some* relevant bit is
    /// set, never "all relevant bits are clear".
    pub fn is_dirty_any(&self, mask: StateBits) -> bool {
        intersects(self.bits(), mask)
    }

    /// Register a change listener (0→1 transitions only). Returns `&self`
    /// for chaining.
    pub fn add_change_listener(&self, listener: Arc<dyn StateListener>) -> &Self {
        self.change_listeners
            .write()
            .push(Registration::Unfiltered(listener));
        self
    }

    /// Register a change listener that only sees bits inside `mask`.
    pub fn add_change_listener_filtered(
        &self,
        mask: StateBits,
        listener: Arc<dyn StateListener>,
    ) -> &Self {
        self.change_listeners
            .write()
            .push(Registration::Filtered {
                mask,
                inner: listener,
            });
        self
    }

    /// Register an invalidate listener (every accepted `set`). Returns
    /// `&self` for chaining.
    pub fn add_invalidate_listener(&self, listener: Arc<dyn StateListener>) -> &Self {
        self.invalidate_listeners
            .write()
            .push(Registration::Unfiltered(listener));
        self
    }

    /// Register an invalidate listener that only sees bits inside `mask`.
    pub fn add_invalidate_listener_filtered(
        &self,
        mask: StateBits,
        listener: Arc<dyn StateListener>,
    ) -> &Self {
        self.invalidate_listeners
            .write()
            .push(Registration::Filtered {
                mask,
                inner: listener,
            });
        self
    }

    /// Remove one change-listener registration matching `listener` by
    /// identity (through one level of filter unwrapping).
    ///
    /// Removing a listener that was registered more than once panics: it is
    /// ambiguous which registration should be dropped. Removing a listener
    /// that was never registered is a no-op.
    pub fn remove_change_listener(&self, listener: &Arc<dyn StateListener>) -> &Self {
        Self::remove(&self.change_listeners, listener, &self.source, "change");
        self
    }

    /// Remove one invalidate-listener registration matching `listener` by
    /// identity. Same ambiguity rule as [`remove_change_listener`].
    ///
    /// [`remove_change_listener`]: BitState::remove_change_listener
    pub fn remove_invalidate_listener(&self, listener: &Arc<dyn StateListener>) -> &Self {
        Self::remove(
            &self.invalidate_listeners,
            listener,
            &self.source,
            "invalidate",
        );
        self
    }

    fn notify(list: &RwLock<Vec<Registration>>, bits: StateBits) {
        // Snapshot so listeners may mutate the list without deadlocking.
        let snapshot: Vec<Registration> = list.read().clone();
        for registration in &snapshot {
            let masked = bits & registration.mask();
            if masked != 0 {
                registration.inner().on_bits(masked);
            }
        }
    }

    fn remove(
        list: &RwLock<Vec<Registration>>,
        listener: &Arc<dyn StateListener>,
        source: &str,
        kind: &str,
    ) {
        let mut registrations = list.write();
        let occurrences = registrations
            .iter()
            .filter(|r| r.matches(listener))
            .count();
        assert!(
            occurrences <= 1,
            "BitState[{source}]: {kind} listener registered {occurrences} times; removal is ambiguous"
        );
        if let Some(index) = registrations.iter().position(|r| r.matches(listener)) {
            registrations.remove(index);
        }
    }
}

impl fmt::Debug for BitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitState")
            .field("source", &self.source)
            .field("state", &format_args!("{:#b}", self.bits()))
            .field("filter", &format_args!("{:#b}", self.filter))
            .finish()
    }
}
