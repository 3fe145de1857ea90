//! Data models for room sessions
//!
//! This module contains the core data structures used throughout the crate:
//! connection states, media track handles and per-session options.

pub mod options;
pub mod state;
pub mod tracks;
