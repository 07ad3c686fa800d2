//! # Module Views
//!
//! Per-module list loaders: one row-filtered SELECT per scope, with
//! outcomes converted into renderable state.

pub mod loader;
pub mod module;

pub use loader::{ViewError, ViewLoader, ViewState};
pub use module::ModuleView;
