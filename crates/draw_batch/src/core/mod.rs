//! Core benchmark settings

pub mod config;

pub use config::{BenchConfig, DEFAULT_DRAW_LIST_INTERVAL};
