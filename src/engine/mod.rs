//! The matching engine: per-market order books, price-time priority
//! matching, and the single-consumer dispatcher that lazily spins up one
//! book per market from the durable action log.

mod book;
mod callbacks;
mod dispatcher;
mod types;

pub use book::Book;
pub use callbacks::MatchCallbacks;
pub use dispatcher::{run_dispatcher, DispatcherHandle, MarketResolver};
pub use types::MarketParams;
