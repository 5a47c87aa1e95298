//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Resource`: one unit of crawl work, a URL plus its fetch/processing state
//! - `ResourceKind`: the closed set of content kinds, one processor each
//! - `ResourceState`: the per-resource lifecycle (queued, fetching, processing, saving, terminal)

mod resource;
mod resource_state;

// Re-export main types
pub use resource::{Resource, ResourceKind};
pub use resource_state::ResourceState;
