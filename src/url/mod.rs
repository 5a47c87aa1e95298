//! URL handling module for Sumi-Mirror
//!
//! This module provides URL normalization, host extraction and wildcard
//! host matching. These are the building blocks the canonicalization
//! pipeline is assembled from.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::{extract_host, host_dir};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{normalize_parsed, normalize_url, NormalizeOptions};
