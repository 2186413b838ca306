//! Helm Clock Infrastructure
//!
//! Time sources behind the [`Clock`] port:
//!
//! - [`SystemClock`]: wall-clock time for production
//! - [`ManualClock`]: time that only moves when told to, for staleness and
//!   retention tests that would otherwise need to sleep for tens of seconds
//!
//! ## Usage
//!
//! ```ignore
//! use helm_clock::{Clock, ManualClock};
//! use chrono::Duration;
//!
//! let clock = ManualClock::new(None);
//! let t0 = clock.now();
//! clock.advance(Duration::seconds(31));
//! assert_eq!(clock.now() - t0, Duration::seconds(31));
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

// Re-export the Clock trait for convenience
pub use helm_core::Clock;
