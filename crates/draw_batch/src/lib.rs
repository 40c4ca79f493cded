//! # Draw Batch
//!
//! A draw-submission benchmark core: a large, resizable batch of indexed
//! triangle draws issued every frame through one of several upload and
//! batching strategies, over a visible subset that rotates on a fixed cadence.
//!
//! ## Features
//!
//! - **Capability resolution**: requested features degrade gracefully to what the backend supports
//! - **Object pool**: slot-indexed arena growing in powers of four from 128
//! - **Draw lists**: candidate subsets rotated every N frames
//! - **Repacking**: index, offset and uniform block data rewritten in list order
//! - **Strategies**: six submission paths from multi-draw with uniform blocks down to per-draw uniforms
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use draw_batch::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = RecordingBackend::new(BackendCapabilities::from_profile(&BackendProfile::default()));
//!     let config = BenchConfig::from_params([("use_multi_draw", "1"), ("webgl_version", "2")])?;
//!
//!     let mut stage = BenchStage::new(backend, &config)?;
//!     stage.tune(1_000)?;
//!     for _ in 0..100 {
//!         let stats = stage.animate(16.0)?;
//!         log::info!("{} objects in {} calls", stats.objects_drawn, stats.draw_calls);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for benchmark drivers
pub mod prelude {
    pub use crate::{
        batch::{
            BenchStage, DrawListPattern, FrameStats, RequestedFeatures, StageError,
            StatsSummary, SubmissionStrategy,
        },
        config::{Config, ConfigError},
        core::BenchConfig,
        foundation::time::Stopwatch,
        render::{
            ApiVersion, BackendCapabilities, BackendProfile, Extensions, GraphicsBackend,
            RecordingBackend,
        },
    };
}
