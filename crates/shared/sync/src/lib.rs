//! Helm Sync Primitives
//!
//! Small thread-safe building blocks used on both sides of the system:
//!
//! - [`UpdateSignal`]: coalescing wake-up between a feed thread (producer) and a
//!   decision loop (consumer). Rapid raises collapse into one pending wake.
//! - [`RingBuffer`]: fixed-capacity FIFO with oldest-first eviction, used for
//!   captured worker logs.

mod ring;
mod signal;

pub use ring::RingBuffer;
pub use signal::{UpdateKind, UpdateSignal, Updates};
