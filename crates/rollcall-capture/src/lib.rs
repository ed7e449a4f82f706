//! Identity capture for rollcall
//!
//! This crate turns raw input from capture devices into subject identifiers:
//! - Keystroke-wedge barcode bursts, with escape decoding and quiet-period reset
//! - Optical codes from a cancellable camera sampling loop
//! - Manual selection, optionally backdated
//!
//! Device access sits behind the [`FrameSource`] and [`CodeDecoder`] traits;
//! this crate contains no platform camera code itself.

mod mock;
mod optical;
mod resolver;
mod wedge;

pub use mock::*;
pub use optical::*;
pub use resolver::*;
pub use wedge::*;
