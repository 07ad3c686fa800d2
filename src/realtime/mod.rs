//! # Realtime Subscriptions
//!
//! Client side of the backend change feed.
//!
//! ## Architecture
//!
//! - **Descriptor**: which schema/table/filter to listen to, and whether to
//! - **Adapter**: owns one registration, forwards events to a handler,
//!   releases before re-registering

pub mod adapter;
pub mod descriptor;
pub mod errors;

pub use adapter::{ChangeHandler, RealtimeSubscription, SubscriptionStatus};
pub use descriptor::{SubscriptionDescriptor, PRIMARY_SCHEMA};
pub use errors::{RealtimeError, RealtimeResult};
