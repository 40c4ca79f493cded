//! Frame driver
//!
//! Stands in for the display loop: feeds the stage a fixed frame delta,
//! ramps the object count toward a target, and logs a report every few frames.

use draw_batch::batch::{BenchStage, StageError, StatsSummary};
use draw_batch::render::GraphicsBackend;
use serde::{Deserialize, Serialize};

/// Ramp driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Frames to run
    pub frames: u64,
    /// Object count the ramp stops at
    pub target_object_count: usize,
    /// Objects added per frame while below the target
    pub tune_step: usize,
    /// Simulated frame delta in milliseconds
    pub frame_time_ms: f32,
    /// Frames per report, 0 disables reports
    pub report_interval: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            target_object_count: 10_000,
            tune_step: 250,
            frame_time_ms: 16.0,
            report_interval: 60,
        }
    }
}

/// Drives a stage for a fixed number of frames
pub struct RampDriver {
    config: DriverConfig,
}

impl RampDriver {
    /// Create a driver
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Count change to request this frame
    pub fn tune_delta(&self, complexity: usize) -> i64 {
        let missing = self.config.target_object_count.saturating_sub(complexity);
        i64::try_from(missing.min(self.config.tune_step)).unwrap_or(i64::MAX)
    }

    /// Run every frame and return totals over the whole run
    pub fn run<B: GraphicsBackend>(
        &self,
        stage: &mut BenchStage<B>,
    ) -> Result<StatsSummary, StageError> {
        let mut total = StatsSummary::default();
        let mut window = StatsSummary::default();

        for _ in 0..self.config.frames {
            stage.tune(self.tune_delta(stage.complexity()))?;
            let stats = stage.animate(self.config.frame_time_ms)?;
            total.record(&stats);
            window.record(&stats);

            if self.config.report_interval > 0 && window.frames == self.config.report_interval {
                log::info!(
                    "frame {:>6} | {:>7} objects | list {} | {:>8.1} objects/frame | {:>7} calls | {:>8.1} us/frame | {} repacks",
                    stats.frame,
                    stage.complexity(),
                    stats.active_list,
                    window.avg_objects_per_frame(),
                    window.draw_calls,
                    window.avg_frame_time_us(),
                    window.repacks
                );
                window.reset();
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draw_batch::core::BenchConfig;
    use draw_batch::render::{BackendCapabilities, BackendProfile, RecordingBackend};

    #[test]
    fn test_tune_delta_stops_at_target() {
        let driver = RampDriver::new(DriverConfig {
            target_object_count: 1_000,
            tune_step: 300,
            ..DriverConfig::default()
        });
        assert_eq!(driver.tune_delta(0), 300);
        assert_eq!(driver.tune_delta(900), 100);
        assert_eq!(driver.tune_delta(1_000), 0);
        assert_eq!(driver.tune_delta(5_000), 0);
    }

    #[test]
    fn test_run_ramps_to_target() {
        let backend = RecordingBackend::new(BackendCapabilities::from_profile(&BackendProfile::default()))
            .without_command_log();
        let mut stage = BenchStage::new(backend, &BenchConfig::default()).unwrap();
        let driver = RampDriver::new(DriverConfig {
            frames: 12,
            target_object_count: 600,
            tune_step: 100,
            report_interval: 5,
            ..DriverConfig::default()
        });

        let total = driver.run(&mut stage).unwrap();
        assert_eq!(total.frames, 12);
        assert_eq!(stage.complexity(), 600);
        assert_eq!(stage.pool().capacity(), 2_048);
        assert_eq!(stage.backend().counters().clears, 12);
    }
}
