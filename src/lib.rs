//! campusdesk - realtime client core of a multi-tenant school dashboard
//!
//! - [`realtime`]: change-feed subscription adapter
//! - [`counter`]: counts kept fresh by the change feed
//! - [`access`]: role registry and permission lookups
//! - [`views`]: per-module list loaders
//!
//! Every component takes an explicit [`backend::BackendClient`].

pub mod access;
pub mod backend;
pub mod cli;
pub mod config;
pub mod counter;
pub mod generation;
pub mod observability;
pub mod realtime;
pub mod views;
