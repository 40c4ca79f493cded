//! Foundation module - Core utilities
//!
//! - Time management (frame clock, stopwatch)
//! - Logging utilities

pub mod logging;
pub mod time;
