//! Submission statistics

/// What one `animate` call submitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 1
    pub frame: u64,

    /// Index of the active draw list
    pub active_list: usize,

    /// Objects drawn this frame
    pub objects_drawn: usize,

    /// Backend draw entry points called (a multi-draw counts once)
    pub draw_calls: usize,

    /// Of which were multi-draw calls
    pub multi_draw_calls: usize,

    /// Scalar uniform writes
    pub uniform_writes: usize,

    /// Uniform block chunk bindings
    pub uniform_block_binds: usize,

    /// Whether derived buffers were repacked before drawing
    pub repacked: bool,

    /// Time spent in `animate` (microseconds)
    pub submission_time_us: u64,
}

impl FrameStats {
    /// Average objects per backend draw call
    pub fn avg_objects_per_call(&self) -> f32 {
        if self.draw_calls == 0 {
            0.0
        } else {
            self.objects_drawn as f32 / self.draw_calls as f32
        }
    }
}

/// Totals over a run of frames, for periodic reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    /// Frames recorded
    pub frames: u64,
    /// Objects drawn over all frames
    pub objects_drawn: u64,
    /// Draw calls over all frames
    pub draw_calls: u64,
    /// Multi-draw calls over all frames
    pub multi_draw_calls: u64,
    /// Frames that repacked
    pub repacks: u64,
    /// Submission time over all frames (microseconds)
    pub submission_time_us: u64,
}

impl StatsSummary {
    /// Add one frame
    pub fn record(&mut self, stats: &FrameStats) {
        self.frames += 1;
        self.objects_drawn += stats.objects_drawn as u64;
        self.draw_calls += stats.draw_calls as u64;
        self.multi_draw_calls += stats.multi_draw_calls as u64;
        self.repacks += u64::from(stats.repacked);
        self.submission_time_us += stats.submission_time_us;
    }

    /// Average submission time per frame in microseconds
    pub fn avg_frame_time_us(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.submission_time_us as f64 / self.frames as f64
        }
    }

    /// Average objects drawn per frame
    pub fn avg_objects_per_frame(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.objects_drawn as f64 / self.frames as f64
        }
    }

    /// Objects drawn per second of submission time
    pub fn objects_per_second(&self) -> f64 {
        if self.submission_time_us == 0 {
            0.0
        } else {
            self.objects_drawn as f64 * 1_000_000.0 / self.submission_time_us as f64
        }
    }

    /// Start a new reporting window
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
