//! Ports (traits) marking the boundary between domain logic and infrastructure.

mod clock;

pub use clock::Clock;
