//! Dirty-state signaling for ChartSync
//!
//! This crate implements the invalidation side of the pipeline:
//! - BitState: an atomic dirty bitmask with change/invalidate listeners
//! - WaitableBitState: a BitState that threads can park on until dirty
//!
//! A data object owns one `BitState`. Producers set bits on it after
//! mutating the object; listeners fan the notification out, typically into
//! an aggregate root `WaitableBitState` that a background worker parks on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bit_state;
pub mod waitable;

pub use bit_state::{BitState, StateListener};
pub use waitable::WaitableBitState;
