//! Shared foundational types used across the ffwd build cache.
//!
//! This crate provides content hashing for change detection and the module
//! identifier used to key per-module cache state.

#![warn(missing_docs)]

pub mod hash;
pub mod module_id;

pub use hash::{ContentHash, DigestBuilder, ParseHashError};
pub use module_id::{ModuleId, ParseModuleIdError};
