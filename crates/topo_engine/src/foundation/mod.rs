//! Foundation module - Core utilities and types
//!
//! - Math aliases and small projection helpers
//! - Frame timing
//! - Logging setup

pub mod math;
pub mod time;
pub mod logging;
