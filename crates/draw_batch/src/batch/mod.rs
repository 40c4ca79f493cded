//! # Draw Batch Management
//!
//! The engine that decides what is drawn each frame and how it reaches the
//! backend.
//!
//! ## Architecture
//!
//! ```text
//! resolver ──→ ResolvedConfig (strategy fixed for the run)
//!                 │
//!                 ▼
//! pool ──→ slot arrays + static buffers
//!                 │
//! draw_list ──→ active list ──→ repack ──→ list-ordered buffers
//!                                              │
//!                                              ▼
//!                                 strategy ──→ backend draws
//! ```
//!
//! [`stage::BenchStage`] owns all of it and exposes the per-frame step.

pub mod draw_list;
pub mod pool;
pub mod repack;
pub mod resolver;
pub mod stage;
pub mod stats;
pub mod strategy;


pub use draw_list::{DrawListPattern, DrawListScheduler, SchedulerTick};
pub use pool::{ObjectPool, PoolError, PoolResult, SlotTransform, TransformRecord};
pub use repack::RepackedBuffers;
pub use resolver::{resolve, Downgrade, RequestedFeatures, Resolution, ResolvedConfig, UploadMode};
pub use stage::{BenchStage, StageError, StageResult};
pub use stats::{FrameStats, StatsSummary};
pub use strategy::SubmissionStrategy;
