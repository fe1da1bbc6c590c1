//! StateBits: the opaque dirty-bit bitmask
//!
//! ChartSync never interprets individual bits. Consuming layers define their
//! own named constants (a renderer might use bit 0 for "data added", bit 1
//! for "layout changed", and so on) and this core only combines, filters,
//! and clears them.
//!
//! A `u64` gives 64 independent dirty channels per state object, which is
//! more than the renderer-facing layers have ever needed.

/// Opaque dirty-bit bitmask.
///
/// Consumers define the meaning of each bit; this core treats the value as
/// an uninterpreted set of flags.
pub type StateBits = u64;

/// Mask accepting every bit (the default filter).
pub const ALL_BITS: StateBits = StateBits::MAX;

/// The empty mask: no bits set, nothing dirty.
pub const NO_BITS: StateBits = 0;

/// Returns true if `bits` and `mask` share at least one set bit.
///
/// This is the dirty-query polarity used throughout ChartSync: a masked
/// query is "dirty" when *some* relevant bit is set, never when all are
/// clear.
#[inline]
pub fn intersects(bits: StateBits, mask: StateBits) -> bool {
    bits & mask != 0
}
