//! Draw lists and their scheduler
//!
//! A draw list is an ordered sequence of slot indices: the objects drawn this
//! rotation, in draw order. Lists are described by [`DrawListPattern`]s and
//! built against the pool capacity, so they are rebuilt whenever the pool grows.
//!
//! The [`DrawListScheduler`] counts frames down and switches to the next
//! candidate list when the countdown expires:
//!
//! ```text
//!            tick (countdown > 1)
//!          ┌───────────┐
//!          ▼           │
//!      ┌─────────┐     │      tick (countdown == 1)      ┌─────────┐
//!      │ Waiting │─────┘ ──────────────────────────────→ │ Rotated │
//!      └─────────┘ ←──────────── reset countdown ──────── └─────────┘
//! ```
//!
//! The caller repacks on `Rotated` before anything is drawn that frame.

use serde::{Deserialize, Serialize};

/// How to derive one candidate draw list from the pool capacity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawListPattern {
    /// Every slot in order
    All,
    /// A fixed set of slots; those past the capacity are dropped
    Fixed {
        /// Slot indices in draw order
        slots: Vec<usize>,
    },
    /// `offset`, `offset + stride`, `offset + 2 * stride`, ...
    Strided {
        /// Distance between drawn slots
        stride: usize,
        /// First drawn slot
        offset: usize,
    },
    /// The first `capacity / divisor` indices, each multiplied by `scale`
    Scaled {
        /// Fraction of the capacity to take
        divisor: usize,
        /// Multiplier applied to each index
        scale: usize,
    },
}

impl DrawListPattern {
    /// Candidate lists used when none are configured
    pub fn default_set() -> Vec<Self> {
        vec![
            Self::All,
            Self::Fixed {
                slots: vec![0, 10, 20, 30],
            },
            Self::Strided { stride: 4, offset: 0 },
            Self::Strided { stride: 2, offset: 1 },
            Self::Scaled { divisor: 8, scale: 4 },
        ]
    }

    /// Build the list for a pool of `capacity` slots
    ///
    /// Every index in the result is below `capacity`, and the list never has
    /// more than `capacity` entries.
    pub fn build(&self, capacity: usize) -> Vec<usize> {
        let mut list: Vec<usize> = match self {
            Self::All => (0..capacity).collect(),
            Self::Fixed { slots } => slots.iter().copied().filter(|&slot| slot < capacity).collect(),
            Self::Strided { stride, offset } => {
                (*offset..capacity).step_by((*stride).max(1)).collect()
            }
            Self::Scaled { divisor, scale } => (0..capacity / (*divisor).max(1))
                .map_while(|i| i.checked_mul(*scale))
                .filter(|&slot| slot < capacity)
                .collect(),
        };
        list.truncate(capacity);
        list
    }

    /// Reject patterns that cannot describe a useful list
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Strided { stride: 0, .. } => Err("strided draw list with stride 0".into()),
            Self::Scaled { divisor: 0, .. } => Err("scaled draw list with divisor 0".into()),
            Self::Scaled { scale: 0, .. } => Err("scaled draw list with scale 0".into()),
            _ => Ok(()),
        }
    }
}

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerTick {
    /// Same list as last frame
    Waiting {
        /// Ticks left before the next rotation
        remaining: u32,
    },
    /// Switched to a new list, which must be repacked before drawing
    Rotated {
        /// Index of the now active candidate
        index: usize,
    },
}

/// Rotates among candidate draw lists on a frame cadence
#[derive(Debug, Clone)]
pub struct DrawListScheduler {
    patterns: Vec<DrawListPattern>,
    lists: Vec<Vec<usize>>,
    interval: u32,
    countdown: u32,
    active: usize,
}

impl DrawListScheduler {
    /// Create a scheduler over `patterns`, rotating every `interval` ticks
    ///
    /// An empty pattern list falls back to [`DrawListPattern::default_set`] and
    /// an interval of 0 to 1, both with a warning. Lists stay empty until
    /// [`DrawListScheduler::rebuild`] is called with a capacity.
    pub fn new(patterns: Vec<DrawListPattern>, interval: u32) -> Self {
        let patterns = if patterns.is_empty() {
            log::warn!("No draw list patterns configured, using the default set");
            DrawListPattern::default_set()
        } else {
            patterns
        };
        let interval = if interval == 0 {
            log::warn!("Draw list interval 0 is invalid, rotating every frame");
            1
        } else {
            interval
        };

        let lists = vec![Vec::new(); patterns.len()];
        Self {
            patterns,
            lists,
            interval,
            countdown: interval,
            active: 0,
        }
    }

    /// Rebuild every candidate list for a new pool capacity
    ///
    /// The active index and the countdown are kept.
    pub fn rebuild(&mut self, capacity: usize) {
        for (list, pattern) in self.lists.iter_mut().zip(&self.patterns) {
            *list = pattern.build(capacity);
        }
        self.active %= self.lists.len();
        log::debug!(
            "Rebuilt {} draw lists for capacity {} (sizes {:?})",
            self.lists.len(),
            capacity,
            self.lists.iter().map(Vec::len).collect::<Vec<_>>()
        );
    }

    /// Advance one frame
    pub fn tick(&mut self) -> SchedulerTick {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return SchedulerTick::Waiting {
                remaining: self.countdown,
            };
        }

        self.countdown = self.interval;
        self.active = (self.active + 1) % self.lists.len();
        log::trace!(
            "Draw list rotated to {} ({} objects)",
            self.active,
            self.lists[self.active].len()
        );
        SchedulerTick::Rotated { index: self.active }
    }

    /// The active draw list
    pub fn active(&self) -> &[usize] {
        &self.lists[self.active]
    }

    /// Index of the active candidate
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// All candidate lists
    pub fn lists(&self) -> &[Vec<usize>] {
        &self.lists
    }

    /// Number of candidate lists
    pub fn candidate_count(&self) -> usize {
        self.lists.len()
    }

    /// Frames between rotations
    pub fn interval(&self) -> u32 {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lists() {
        let lists: Vec<Vec<usize>> = DrawListPattern::default_set()
            .iter()
            .map(|pattern| pattern.build(128))
            .collect();
        assert_eq!(lists[0].len(), 128);
        assert_eq!(lists[1], vec![0, 10, 20, 30]);
        assert_eq!(&lists[2][..3], &[0, 4, 8]);
        assert_eq!(lists[2].len(), 32);
        assert_eq!(&lists[3][..3], &[1, 3, 5]);
        assert_eq!(lists[3].len(), 64);
        assert_eq!(lists[4], (0..16).map(|i| i * 4).collect::<Vec<_>>());
    }

    #[test]
    fn test_lists_stay_in_range() {
        let patterns = vec![
            DrawListPattern::Fixed {
                slots: vec![3, 1000, 127, 128],
            },
            DrawListPattern::Scaled { divisor: 2, scale: 3 },
            DrawListPattern::Strided { stride: 5, offset: 200 },
        ];
        for pattern in &patterns {
            assert!(pattern.build(128).iter().all(|&slot| slot < 128), "{pattern:?}");
        }
        assert_eq!(patterns[0].build(128), vec![3, 127]);
        assert!(patterns[2].build(128).is_empty());
        assert_eq!(patterns[0].build(2048), vec![3, 1000, 127, 128]);
    }

    #[test]
    fn test_rotation_after_interval() {
        let mut scheduler = DrawListScheduler::new(DrawListPattern::default_set(), 3);
        scheduler.rebuild(128);

        assert_eq!(scheduler.tick(), SchedulerTick::Waiting { remaining: 2 });
        assert_eq!(scheduler.tick(), SchedulerTick::Waiting { remaining: 1 });
        assert_eq!(scheduler.active_index(), 0);
        assert_eq!(scheduler.tick(), SchedulerTick::Rotated { index: 1 });
        assert_eq!(scheduler.active(), &[0, 10, 20, 30]);
    }

    #[test]
    fn test_rotation_is_cyclic() {
        let mut scheduler = DrawListScheduler::new(DrawListPattern::default_set(), 2);
        scheduler.rebuild(512);
        let start = scheduler.active().to_vec();

        let mut rotations = 0;
        for _ in 0..scheduler.candidate_count() * 2 {
            if matches!(scheduler.tick(), SchedulerTick::Rotated { .. }) {
                rotations += 1;
            }
        }
        assert_eq!(rotations, scheduler.candidate_count());
        assert_eq!(scheduler.active_index(), 0);
        assert_eq!(scheduler.active(), &start[..]);
    }

    #[test]
    fn test_rebuild_keeps_active_index() {
        let mut scheduler = DrawListScheduler::new(DrawListPattern::default_set(), 1);
        scheduler.rebuild(128);
        scheduler.tick();
        scheduler.tick();
        assert_eq!(scheduler.active_index(), 2);

        scheduler.rebuild(2048);
        assert_eq!(scheduler.active_index(), 2);
        assert_eq!(scheduler.active().len(), 512);
        assert!(scheduler
            .lists()
            .iter()
            .all(|list| list.iter().all(|&slot| slot < 2048)));
    }

    #[test]
    fn test_degenerate_configuration_falls_back() {
        let scheduler = DrawListScheduler::new(Vec::new(), 0);
        assert_eq!(scheduler.candidate_count(), 5);
        assert_eq!(scheduler.interval(), 1);

        assert!(DrawListPattern::Strided { stride: 0, offset: 0 }.validate().is_err());
        assert!(DrawListPattern::Scaled { divisor: 0, scale: 1 }.validate().is_err());
        assert!(DrawListPattern::All.validate().is_ok());
    }

    #[test]
    fn test_scaled_list_with_huge_scale() {
        let pattern = DrawListPattern::Scaled {
            divisor: 8,
            scale: usize::MAX / 2,
        };
        assert!(pattern.validate().is_ok());
        // Overflowing products end the list instead of wrapping
        assert_eq!(pattern.build(128), vec![0]);

        let pattern = DrawListPattern::Scaled {
            divisor: 1,
            scale: usize::MAX,
        };
        assert_eq!(pattern.build(1_000), vec![0]);
    }

    #[test]
    fn test_pattern_serde() {
        #[derive(Deserialize)]
        struct Lists {
            draw_lists: Vec<DrawListPattern>,
        }
        let parsed: Lists = toml::from_str(
            r#"
            [[draw_lists]]
            kind = "all"

            [[draw_lists]]
            kind = "strided"
            stride = 4
            offset = 1
            "#,
        )
        .unwrap();
        assert_eq!(
            parsed.draw_lists,
            vec![
                DrawListPattern::All,
                DrawListPattern::Strided { stride: 4, offset: 1 }
            ]
        );
    }
}
