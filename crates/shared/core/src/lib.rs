//! Helm Core Domain
//!
//! Pure domain types shared by the process supervisor and the strategy workers.
//! This crate contains no threads, no I/O, and is 100% unit testable.

pub mod entities;
pub mod ports;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Account stream
    AccountEvent,
    // Market data
    BookLevel,
    Fill,
    OrderbookSnapshot,
    // Worker lifecycle
    ProcessState,
    Side,
    StopMethod,
    StrategyKind,
    UnknownStrategy,
};
pub use ports::Clock;
pub use values::{ConfigKey, Price, Quantity, Timestamp, strip_namespace};
