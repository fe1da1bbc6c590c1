//! EventProcessor: the injectable event-processing strategy
//!
//! The composition root owns one processor; everything else reaches it via
//! [`global`]. The default is a lazily-spawned [`ThreadEventProcessor`]
//! with an accept-all mask; callers that need different scheduling (e.g.
//! running actions inline on a render thread) install their own strategy
//! with [`set_global`].
//!
//! [`ThreadEventProcessor`]: crate::ThreadEventProcessor

use crate::thread_processor::ThreadEventProcessor;
use chartsync_core::bits::{StateBits, ALL_BITS};
use chartsync_state::BitState;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

/// An action invoked when its tracked state reports dirty bits.
///
/// Actions must be quick, or must internally take whichever lock they need
/// on the target object; a slow action delays every other action behind it
/// on the same processor.
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// Strategy interface for draining dirty-bit notifications.
///
/// Implementations decide *where* and *when* registered actions run; the
/// contract they all share:
///
/// - after `state.set(bits)` with bits inside the processor mask, the
///   action runs at least once, and `state` is clean again when it does
/// - multiple `set` calls before the action runs may coalesce into one
///   invocation (lossy batching)
/// - a panicking action is isolated: it is reported, discarded, and never
///   prevents other actions or later cycles
pub trait EventProcessor: Send + Sync {
    /// Register `action` to run whenever `state` turns dirty under the
    /// processor mask. Also wires `state` into the processor's wake
    /// mechanism.
    fn add_action(&self, state: Arc<BitState>, action: Action);

    /// The bit mask this processor tracks; bits outside it never trigger
    /// actions.
    fn mask(&self) -> StateBits;
}

/// Process-wide default processor, lazily spawned on first use.
static GLOBAL: Lazy<RwLock<Arc<dyn EventProcessor>>> = Lazy::new(|| {
    let processor: Arc<dyn EventProcessor> = ThreadEventProcessor::spawn(ALL_BITS)
        .expect("failed to spawn the default event-processor worker");
    RwLock::new(processor)
});

/// The process-wide event processor.
///
/// Lazily constructs the default [`ThreadEventProcessor`] on first call.
///
/// [`ThreadEventProcessor`]: crate::ThreadEventProcessor
pub fn global() -> Arc<dyn EventProcessor> {
    GLOBAL.read().clone()
}

/// Replace the process-wide event processor.
///
/// Registrations made on the previous processor stay with it; only future
/// `add_action` calls through [`global`] reach the new one.
pub fn set_global(processor: Arc<dyn EventProcessor>) {
    *GLOBAL.write() = processor;
}
