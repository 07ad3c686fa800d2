//! # Derived Live Counters
//!
//! Counts recomputed from the backend whenever the change feed reports a
//! relevant row change. The stock counter is unread messages per school.

pub mod definition;
pub mod live;
pub mod state;

pub use definition::CounterSpec;
pub use live::LiveCounter;
pub use state::{CounterPhase, CounterState};
