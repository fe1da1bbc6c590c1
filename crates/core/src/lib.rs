//! Core types for ChartSync
//!
//! This crate defines the foundational types shared by the lock, state, and
//! event-processing crates:
//! - StateBits: opaque dirty-bit bitmask (consumers define the named bits)
//! - Error: error type hierarchy for recoverable conditions
//! - thread_id: stable per-thread identity for reentrant lock ownership

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bits;
pub mod error;
pub mod thread_id;

pub use bits::{StateBits, ALL_BITS, NO_BITS};
pub use error::{Error, Result};
pub use thread_id::current_thread_id;
