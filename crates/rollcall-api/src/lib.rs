//! Shared types for rollcall
//!
//! This crate defines the stable surface between capture front ends and the
//! session engine:
//! - Actions, sessions and derived presence
//! - Scanner modes and resolved identities
//! - Attendance outcomes (recorded, rejected, failed)

mod outcome;
mod types;

pub use outcome::*;
pub use types::*;
