mod account_event;
mod fill;
mod orderbook;
mod process_state;
mod side;
mod strategy;

pub use account_event::AccountEvent;
pub use fill::Fill;
pub use orderbook::{BookLevel, OrderbookSnapshot};
pub use process_state::{ProcessState, StopMethod};
pub use side::Side;
pub use strategy::{StrategyKind, UnknownStrategy};
