//! # Access
//!
//! Role registry and permission lookups. Presence of a row granted by
//! row-level security is the permission; absence is a user-facing denial,
//! kept distinct from lookup failures.

pub mod errors;
pub mod permission;
pub mod roles;

pub use errors::{AccessError, AccessResult};
pub use permission::{current_user_id, linked_profile, require_admin, require_row, resolve_role};
pub use roles::{is_valid_role, Role};
