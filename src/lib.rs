//! ChartSync - concurrency core for high-frequency charting data
//!
//! ChartSync lets a data-producer thread mutate a shared mutable dataset
//! while a rendering thread reads it with minimal contention and without
//! tearing, and routes "what changed" notifications to a background
//! worker. Three pieces:
//!
//! - [`DataSetLock`]: a reentrant, upgradeable multi-reader/single-writer
//!   lock with an optimistic-read fast path, one per data object
//! - [`BitState`]: an atomic dirty bitmask with change/invalidate
//!   listeners (consumers define what each bit means)
//! - [`ThreadEventProcessor`]: a dedicated worker that parks until any
//!   tracked state turns dirty, then runs the registered actions
//!
//! # Quick start
//!
//! ```
//! use chartsync::DataSetLock;
//!
//! let series = DataSetLock::new(Vec::<f64>::new());
//!
//! // Producer side
//! series.write_lock_guard(|data| data.push(1.0));
//!
//! // Renderer side: non-blocking in the common no-writer case
//! let len = series.read_lock_guard_optimistic(|data| data.len());
//! assert_eq!(len, 1);
//! ```
//!
//! Dirty-state plumbing lives alongside the dataset: after a mutation the
//! producer calls `set(bits)` on the object's [`BitState`]; the
//! process-wide [`event_processor()`] wakes and invokes whatever actions
//! were registered for that object.

pub use chartsync_core::{Error, Result, StateBits, ALL_BITS, NO_BITS};
pub use chartsync_events::{
    global as event_processor, set_global as set_event_processor, Action, EventProcessor,
    ImmediateEventProcessor, ThreadEventProcessor,
};
pub use chartsync_lock::{DataSetLock, StampedLock};
pub use chartsync_state::{BitState, StateListener, WaitableBitState};
