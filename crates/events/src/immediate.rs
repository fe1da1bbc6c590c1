//! ImmediateEventProcessor: inline action execution
//!
//! Some hosts already have a thread that must run the reactions — most
//! commonly a render loop that owns the scene. For those, this strategy
//! skips the background worker entirely: the action runs synchronously on
//! whichever thread called `set`, right inside the notification.
//!
//! The isolation contract is the same as the threaded processor's: a
//! panicking action is caught, reported, and discarded.

use crate::processor::{Action, EventProcessor};
use chartsync_core::bits::StateBits;
use chartsync_state::{BitState, StateListener};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Runs one action inline when its state reports tracked bits.
struct InlineTrigger {
    state: Arc<BitState>,
    action: Action,
    mask: StateBits,
}

impl StateListener for InlineTrigger {
    fn on_bits(&self, bits: StateBits) {
        if bits & self.mask == 0 {
            return;
        }
        self.state.clear_bits(self.mask);
        if catch_unwind(AssertUnwindSafe(|| (self.action)())).is_err() {
            warn!(
                target: "chartsync::events",
                source = self.state.source(),
                "inline event action panicked; discarded"
            );
        }
    }
}

/// Event processor that runs actions synchronously on the notifying
/// thread.
///
/// Unlike [`ThreadEventProcessor`](crate::ThreadEventProcessor) there is
/// no coalescing: every accepted `set` runs the action once. Actions must
/// not call `set` on their own tracked state, or they will recurse.
pub struct ImmediateEventProcessor {
    mask: StateBits,
}

impl ImmediateEventProcessor {
    /// Create an inline processor tracking `mask`.
    pub fn new(mask: StateBits) -> Arc<Self> {
        Arc::new(ImmediateEventProcessor { mask })
    }
}

impl EventProcessor for ImmediateEventProcessor {
    fn add_action(&self, state: Arc<BitState>, action: Action) {
        let trigger: Arc<dyn StateListener> = Arc::new(InlineTrigger {
            state: Arc::clone(&state),
            action,
            mask: self.mask,
        });
        state.add_invalidate_listener(trigger);
    }

    fn mask(&self) -> StateBits {
        self.mask
    }
}
