//! Event processing for ChartSync
//!
//! This crate drains dirty-bit notifications off the producer threads:
//! - EventProcessor: the injectable strategy trait
//! - ThreadEventProcessor: the default dedicated-worker implementation
//! - ImmediateEventProcessor: an inline implementation for callers that
//!   want actions on the notifying thread (e.g. a render loop)
//! - global()/set_global(): the process-wide default instance
//!
//! Producers only ever call `set` on their object's `BitState`; the wiring
//! installed by `add_action` does the rest.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod immediate;
pub mod processor;
pub mod thread_processor;

pub use immediate::ImmediateEventProcessor;
pub use processor::{global, set_global, Action, EventProcessor};
pub use thread_processor::ThreadEventProcessor;
