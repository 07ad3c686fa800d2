//! # Backend Services
//!
//! Contracts of the hosted database service and the implementations
//! shipped with the crate.
//!
//! - **Change feed**: realtime row-change registrations
//! - **Query**: row-filtered SELECT and exact COUNT
//! - **Auth**: the current user
//!
//! All three are reached through one [`BackendClient`] context.

pub mod client;
pub mod errors;
pub mod feed;
pub mod filter;
pub mod memory;
pub mod query;
pub mod rls;
pub mod ws_feed;

pub use client::{AuthService, BackendClient, BackendFuture, QueryService, UserIdentity};
pub use errors::{BackendError, BackendResult};
pub use feed::{
    ChangeEvent, ChangeFeed, EventFilter, EventType, FeedHandle, FeedMessage, FeedRequest,
    FeedSink, FeedStatus, FeedStream,
};
pub use filter::{FilterExpr, FilterOperator};
pub use memory::MemoryBackend;
pub use query::{OrderBy, TableQuery};
pub use rls::{RlsContext, RlsPolicy};
pub use ws_feed::WsChangeFeed;
