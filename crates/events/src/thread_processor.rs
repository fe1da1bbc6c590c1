//! ThreadEventProcessor: the dedicated background worker
//!
//! One worker thread parks on an aggregate root [`WaitableBitState`] that
//! every tracked object's `BitState` feeds (as an invalidate listener).
//! When anything turns dirty the worker wakes, drains the root, and walks
//! the registry: every pair whose own state is dirty under the processor
//! mask has its state cleared and its action invoked. A panicking action
//! is caught, reported via `tracing`, and discarded; one broken action
//! must not stop the wake loop or the other actions.
//!
//! The worker parks with a short timeout rather than indefinitely so it
//! can notice that the processor itself was dropped (all external `Arc`s
//! gone) and exit instead of leaking a thread per test or per replaced
//! global.

use crate::processor::{Action, EventProcessor};
use chartsync_core::bits::StateBits;
use chartsync_core::error::Result;
use chartsync_state::{BitState, WaitableBitState};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// How long the worker parks before re-checking liveness.
const PARK_WINDOW: Duration = Duration::from_millis(100);

struct ActionEntry {
    state: Arc<BitState>,
    action: Action,
}

impl Clone for ActionEntry {
    fn clone(&self) -> Self {
        ActionEntry {
            state: Arc::clone(&self.state),
            action: Arc::clone(&self.action),
        }
    }
}

/// Background-thread event processor (the default strategy).
pub struct ThreadEventProcessor {
    /// Aggregate root every tracked state feeds into.
    root: Arc<WaitableBitState>,
    registry: Mutex<Vec<ActionEntry>>,
    mask: StateBits,
}

impl ThreadEventProcessor {
    /// Spawn a processor tracking `mask` with its dedicated worker thread.
    ///
    /// The worker lives as long as the returned `Arc` has holders and
    /// winds down shortly after the last one drops.
    pub fn spawn(mask: StateBits) -> Result<Arc<Self>> {
        let processor = Arc::new(ThreadEventProcessor {
            root: Arc::new(WaitableBitState::new("event-processor-root")),
            registry: Mutex::new(Vec::new()),
            mask,
        });
        let weak = Arc::downgrade(&processor);
        // The handle is never joined: the worker winds down on its own
        // once the last external Arc drops.
        let _worker = thread::Builder::new()
            .name("chartsync-events".into())
            .spawn(move || Self::run(weak))?;
        Ok(processor)
    }

    /// The aggregate root state (exposed for tests and diagnostics).
    pub fn root(&self) -> &WaitableBitState {
        &self.root
    }

    /// Worker loop: park until dirty, drain the root, run dirty actions.
    fn run(weak: Weak<ThreadEventProcessor>) {
        debug!(target: "chartsync::events", "worker started");
        loop {
            let Some(processor) = weak.upgrade() else {
                debug!(target: "chartsync::events", "processor dropped; worker exiting");
                return;
            };
            let woken = processor.root.wait_while_clean_for(PARK_WINDOW);
            if woken == 0 {
                // Timeout with a clean root: loop around for a liveness
                // check (the upgrade above) and park again.
                continue;
            }
            processor.root.snapshot_and_clear();
            processor.drain_cycle();
        }
    }

    /// One wake cycle: invoke each registered action at most once.
    fn drain_cycle(&self) {
        let entries: Vec<ActionEntry> = self.registry.lock().clone();
        for entry in &entries {
            let drained = entry.state.bits() & self.mask;
            if drained == 0 {
                continue;
            }
            entry.state.clear_bits(self.mask);
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (entry.action)())) {
                // Best-effort isolation: the action owns its own retry and
                // consistency story. Report, never re-raise.
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".into());
                warn!(
                    target: "chartsync::events",
                    source = entry.state.source(),
                    bits = drained,
                    panic = %message,
                    "event action panicked; discarded"
                );
            }
        }
    }
}

impl EventProcessor for ThreadEventProcessor {
    fn add_action(&self, state: Arc<BitState>, action: Action) {
        let mut registry = self.registry.lock();
        // Wire the state into the root once, no matter how many actions
        // track it; a duplicate registration would double-notify the root
        // and make listener removal ambiguous.
        let already_wired = registry
            .iter()
            .any(|entry| Arc::ptr_eq(&entry.state, &state));
        if !already_wired {
            let root: Arc<dyn chartsync_state::StateListener> =
                Arc::clone(&self.root) as Arc<dyn chartsync_state::StateListener>;
            state.add_invalidate_listener(root);
        }
        registry.push(ActionEntry { state, action });
    }

    fn mask(&self) -> StateBits {
        self.mask
    }
}
