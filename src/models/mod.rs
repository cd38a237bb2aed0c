//! Data models for the forum bindings backend.
//!
//! Field names serialize in camelCase to match the dashboard and compose clients.

mod binding;
mod forum;
mod ids;
mod metadata;
mod schema;

pub use binding::*;
pub use forum::*;
pub use ids::*;
pub use metadata::*;
pub use schema::*;
