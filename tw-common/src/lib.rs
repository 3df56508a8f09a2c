//! # trackwall common library
//!
//! Shared code for the trackwall server and carousel client:
//! - Track data model (`EnrichedTrack`, `ColorPalette`, `Rgb`)
//! - Wire constants and query types for the HTTP boundary
//! - Configuration loading
//! - Relative play-time formatting

pub mod api;
pub mod config;
pub mod error;
pub mod human_time;
pub mod model;

pub use error::{Error, Result};
pub use model::{ColorPalette, EnrichedTrack, Rgb};
