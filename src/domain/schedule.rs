use std::time::Duration;

/// One leg of a schedule: move linearly to `target` over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Piecewise-linear target (VUs or arrival rate) over elapsed run time.
///
/// A stage governs from its start instant up to, but excluding, its end: at
/// a boundary the incoming stage applies. Zero-length stages are never
/// governing; they only move the value the next stage ramps from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    start: u64,
    stages: Vec<Stage>,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    index: usize,
    from: u64,
    stage: Stage,
    offset: Duration,
}

impl Schedule {
    #[must_use]
    pub const fn new(start: u64, stages: Vec<Stage>) -> Self {
        Self { start, stages }
    }

    /// A single flat stage holding `value` for `duration`.
    #[must_use]
    pub fn constant(value: u64, duration: Duration) -> Self {
        Self::new(
            value,
            vec![Stage {
                duration,
                target: value,
            }],
        )
    }

    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |total, stage| {
                total.saturating_add(stage.duration)
            })
    }

    /// Highest value the schedule ever asks for.
    #[must_use]
    pub fn peak(&self) -> u64 {
        self.stages
            .iter()
            .map(|stage| stage.target)
            .fold(self.start, u64::max)
    }

    fn locate(&self, elapsed: Duration) -> Option<Position> {
        let mut from = self.start;
        let mut stage_start = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            let stage_end = stage_start.saturating_add(stage.duration);
            if elapsed < stage_end {
                return Some(Position {
                    index,
                    from,
                    stage: *stage,
                    offset: elapsed.saturating_sub(stage_start),
                });
            }
            from = stage.target;
            stage_start = stage_end;
        }
        None
    }

    /// Index of the stage governing `elapsed`; `None` once the schedule ended.
    #[must_use]
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        self.locate(elapsed).map(|position| position.index)
    }

    /// Exact interpolated target; `None` once the schedule ended.
    #[must_use]
    pub fn target_at(&self, elapsed: Duration) -> Option<f64> {
        let position = self.locate(elapsed)?;
        let from = position.from as f64;
        let target = position.stage.target as f64;
        let span = position.stage.duration.as_secs_f64();
        if span <= 0.0 {
            return Some(target);
        }
        let progress = position.offset.as_secs_f64() / span;
        Some(from + (target - from) * progress)
    }

    /// Interpolated target in whole units, truncated toward the stage start.
    #[must_use]
    pub fn value_at(&self, elapsed: Duration) -> Option<u64> {
        let position = self.locate(elapsed)?;
        let from = i128::from(position.from);
        let target = i128::from(position.stage.target);
        let span = i128::try_from(position.stage.duration.as_millis()).unwrap_or(i128::MAX);
        let offset = i128::try_from(position.offset.as_millis()).unwrap_or(i128::MAX);

        let delta = target.saturating_sub(from);
        let step = delta
            .saturating_mul(offset)
            .checked_div(span)
            .unwrap_or(0);
        let value = from.saturating_add(step);
        Some(if value < 0 {
            0
        } else {
            u64::try_from(value).unwrap_or(u64::MAX)
        })
    }

    /// Area under the target curve between two instants, in unit-seconds.
    /// Exact for piecewise-linear stages; used to pace arrivals.
    #[must_use]
    pub fn integral(&self, from: Duration, to: Duration) -> f64 {
        let lower = from.as_secs_f64();
        let upper = to.as_secs_f64();
        if upper <= lower {
            return 0.0;
        }
        let mut total = 0.0;
        let mut previous = self.start as f64;
        let mut stage_start = 0.0;
        for stage in &self.stages {
            let span = stage.duration.as_secs_f64();
            let stage_end = stage_start + span;
            let target = stage.target as f64;
            if span > 0.0 {
                let lo = lower.max(stage_start);
                let hi = upper.min(stage_end);
                if hi > lo {
                    let at = |t: f64| previous + (target - previous) * (t - stage_start) / span;
                    total += (at(lo) + at(hi)) * 0.5 * (hi - lo);
                }
            }
            previous = target;
            stage_start = stage_end;
            if stage_start >= upper {
                break;
            }
        }
        total
    }

    /// Largest change in target any `window` of the schedule can produce.
    #[must_use]
    pub fn max_step(&self, window: Duration) -> u64 {
        let mut from = self.start;
        let mut widest: u64 = 0;
        for stage in &self.stages {
            let delta = stage.target.abs_diff(from);
            let span = stage.duration.as_millis();
            let step = if span == 0 {
                delta
            } else {
                let scaled = u128::from(delta)
                    .saturating_mul(window.as_millis())
                    .div_ceil(span);
                u64::try_from(scaled).unwrap_or(u64::MAX).min(delta)
            };
            widest = widest.max(step);
            from = stage.target;
        }
        widest
    }
}
