//! Session engine for rollcall
//!
//! This crate is the heart of rollcall, containing:
//! - The attendance state machine (Absent <-> Present per subject)
//! - Transition rules: minimum duration, history-wide overlap checks
//! - Per-subject serialization so concurrent requests cannot both commit

mod engine;
mod locks;
mod session;

pub use engine::*;
pub use locks::*;
pub use session::*;
