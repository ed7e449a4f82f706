//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (SubjectId, SessionId)
//! - Time utilities (mockable clock, effective-time normalizer, overlap probes)
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
