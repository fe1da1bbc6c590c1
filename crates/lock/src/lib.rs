//! Dataset locking for ChartSync
//!
//! This crate implements the read/write side of the pipeline:
//! - StampedLock: a low-level sequence-stamped lock (blocking reader/writer
//!   paths plus optimistic-read validation)
//! - DataSetLock: the reentrant, upgradeable multi-reader/single-writer
//!   lock that guards one data object
//!
//! A producer thread mutates the guarded object under `write_lock_guard`; a
//! rendering thread inspects it under `read_lock_guard` or, on the hot
//! path, `read_lock_guard_optimistic`, which avoids blocking entirely when
//! no writer is active.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data_set_lock;
pub mod stamped;

pub use data_set_lock::DataSetLock;
pub use stamped::StampedLock;
