//! Benchmark stage
//!
//! The persistent state of one benchmark run and the per-frame step that
//! drives it. Setup resolves capabilities, builds the program, allocates the
//! pool and packs the first draw list; after that the frame driver only calls
//! [`BenchStage::tune`], [`BenchStage::animate`] and [`BenchStage::complexity`].
//!
//! # Frame order
//!
//! ```text
//! animate(dt)
//!   ├── clear
//!   ├── scheduler tick ──→ rotated? ──→ repack + upload
//!   ├── advance clock
//!   └── submit (reads only buffers repacked above)
//! ```

use crate::batch::draw_list::{DrawListScheduler, SchedulerTick};
use crate::batch::pool::{ObjectPool, PoolError};
use crate::batch::repack::RepackedBuffers;
use crate::batch::resolver::{resolve, Downgrade, Resolution, ResolvedConfig};
use crate::batch::stats::FrameStats;
use crate::core::config::BenchConfig;
use crate::foundation::time::{FrameClock, Stopwatch};
use crate::render::backend::{BackendError, GraphicsBackend, ProgramHandle};

/// Color the target is cleared to each frame
pub const CLEAR_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Result type for stage operations
pub type StageResult<T> = Result<T, StageError>;

/// Errors that stop the benchmark
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The program for the resolved variant could not be built; nothing can be drawn
    #[error("Program setup failed: {0}")]
    ProgramSetup(#[source] BackendError),

    /// Pool allocation failed
    #[error("Object pool error: {0}")]
    Pool(#[from] PoolError),

    /// A backend call failed mid-frame
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// One running benchmark: configuration, pool, scheduler and derived buffers
pub struct BenchStage<B: GraphicsBackend> {
    backend: B,
    config: ResolvedConfig,
    downgrades: Vec<Downgrade>,
    program: ProgramHandle,
    pool: ObjectPool,
    scheduler: DrawListScheduler,
    repacked: RepackedBuffers,
    repack_pending: bool,
    clock: FrameClock,
    object_count: usize,
}

impl<B: GraphicsBackend> BenchStage<B> {
    /// Set up a stage on `backend`
    ///
    /// Unsupported features are downgraded, never rejected. Program setup
    /// failure is fatal and logged.
    pub fn new(mut backend: B, bench: &BenchConfig) -> StageResult<Self> {
        let Resolution { config, downgrades } = resolve(&bench.features, backend.capabilities());

        let variant = config.shader_variant();
        let program = match backend
            .create_program(variant)
            .and_then(|program| backend.use_program(program).map(|()| program))
        {
            Ok(program) => program,
            Err(err) => {
                log::error!("Failed to set up {:?} program: {}", variant, err);
                return Err(StageError::ProgramSetup(err));
            }
        };
        backend.set_clear_color(CLEAR_COLOR);

        let mut pool = ObjectPool::new(config, bench.seed);
        pool.ensure_capacity(bench.initial_object_count, &mut backend)?;

        let mut scheduler =
            DrawListScheduler::new(bench.draw_lists.clone(), bench.draw_list_interval);
        scheduler.rebuild(pool.capacity());

        let mut stage = Self {
            backend,
            config,
            downgrades,
            program,
            pool,
            scheduler,
            repacked: RepackedBuffers::new(),
            repack_pending: true,
            clock: FrameClock::new(),
            object_count: bench.initial_object_count,
        };
        stage.repack()?;

        log::info!(
            "Stage ready: {:?}, capacity {}, {} draw lists every {} frames",
            stage.config.strategy,
            stage.pool.capacity(),
            stage.scheduler.candidate_count(),
            stage.scheduler.interval()
        );
        Ok(stage)
    }

    /// Adjust the requested object count by `delta`, growing the pool if needed
    ///
    /// The count never goes below zero. Growth regenerates every slot and
    /// rebuilds the draw lists; the next frame repacks before drawing. When
    /// growth fails the count is left unchanged.
    pub fn tune(&mut self, delta: i64) -> StageResult<()> {
        if delta == 0 {
            return Ok(());
        }

        let count = (self.object_count as i64).saturating_add(delta).max(0);
        let count = usize::try_from(count).unwrap_or(usize::MAX);

        if self.pool.ensure_capacity(count, &mut self.backend)? {
            self.scheduler.rebuild(self.pool.capacity());
            self.repack_pending = true;
        }
        self.object_count = count;
        Ok(())
    }

    /// Run one frame
    pub fn animate(&mut self, time_delta: f32) -> StageResult<FrameStats> {
        let stopwatch = Stopwatch::start_new();
        let mut stats = FrameStats::default();

        self.backend.clear()?;

        if let SchedulerTick::Rotated { .. } = self.scheduler.tick() {
            self.repack_pending = true;
        }
        if self.repack_pending {
            self.repack()?;
            stats.repacked = true;
        }

        let time = self.clock.advance(time_delta);
        self.config.strategy.submit(
            &mut self.backend,
            &mut self.pool,
            self.scheduler.active(),
            &self.repacked,
            time,
            &mut stats,
        )?;

        stats.frame = self.clock.frame_count();
        stats.active_list = self.scheduler.active_index();
        stats.submission_time_us = stopwatch.elapsed_micros();
        Ok(stats)
    }

    /// Current requested object count
    pub fn complexity(&self) -> usize {
        self.object_count
    }

    fn repack(&mut self) -> StageResult<()> {
        self.repacked
            .rebuild(self.scheduler.active(), &self.pool, self.config.strategy);
        self.repacked.upload(&self.pool, &mut self.backend)?;
        self.repack_pending = false;
        Ok(())
    }

    /// Resolved configuration
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Downgrades applied at setup
    pub fn downgrades(&self) -> &[Downgrade] {
        &self.downgrades
    }

    /// Program in use
    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    /// Object pool
    pub fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    /// Draw list scheduler
    pub fn scheduler(&self) -> &DrawListScheduler {
        &self.scheduler
    }

    /// Buffers derived from the active draw list
    pub fn repacked(&self) -> &RepackedBuffers {
        &self.repacked
    }

    /// Elapsed benchmark time
    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    /// Backend the stage draws with
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend, for inspection between frames
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Tear the stage down and hand the backend back
    pub fn into_backend(self) -> B {
        self.backend
    }
}
