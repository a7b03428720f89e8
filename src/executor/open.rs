use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::domain::{ExecutorKind, Schedule};
use crate::error::{AppError, AppResult};
use crate::metrics::{MetricKind, Sample, SampleTags, names, unix_seconds};
use crate::shutdown::ShutdownReceiver;
use crate::vu::{VirtualUser, VuPool};

use super::iteration::{IterationContext, run_once};
use super::{Executor, ExecutorReport};

/// Re-check interval while the target rate is zero.
const RATE_RECHECK: Duration = Duration::from_millis(10);
/// Bounds on how long the pacing loop sleeps between arrival checks.
const MIN_WAIT: Duration = Duration::from_micros(100);
const MAX_WAIT: Duration = Duration::from_millis(10);

/// Constant or ramping arrival rate: iterations start on a clock that does
/// not care how long earlier iterations take.
///
/// Arrivals are paced by integrating the target rate: every time the area
/// under `R(t) / time_unit` crosses another whole iteration, one is due.
/// When the loop wakes late it launches every due arrival back-to-back.
#[derive(Debug, Clone)]
pub struct OpenModelExecutor {
    kind: ExecutorKind,
    schedule: Schedule,
    time_unit: Duration,
}

#[derive(Debug, Default)]
struct Pacing {
    report: ExecutorReport,
    saturated: bool,
    grown_past_preallocated: bool,
}

impl OpenModelExecutor {
    #[must_use]
    pub const fn new(kind: ExecutorKind, schedule: Schedule, time_unit: Duration) -> Self {
        Self {
            kind,
            schedule,
            time_unit,
        }
    }

    /// Start one arrival, growing the pool by one VU if needed. Arrivals
    /// that find the pool at its maximum are dropped and counted.
    fn launch(
        pool: &Arc<VuPool>,
        context: &Arc<IterationContext>,
        due_at: i64,
        pacing: &mut Pacing,
    ) -> AppResult<()> {
        let vu = match pool.acquire() {
            Ok(vu) => Some(vu),
            Err(busy) if busy.cap < pool.max() => {
                let grown = pool.grow_to(busy.cap.saturating_add(1))?;
                if !pacing.grown_past_preallocated {
                    info!("All pre-allocated VUs busy; growing pool (now {}).", grown);
                    pacing.grown_past_preallocated = true;
                }
                pool.acquire().ok()
            }
            Err(_busy) => None,
        };
        match vu {
            Some(vu) => {
                start_once(pool, context, vu)?;
                pacing.report.started = pacing.report.started.saturating_add(1);
            }
            None => {
                if !pacing.saturated {
                    warn!(
                        "VU pool saturated at {} VUs; dropping iterations.",
                        pool.max()
                    );
                    pacing.saturated = true;
                }
                pacing.report.dropped = pacing.report.dropped.saturating_add(1);
                let dropped = Sample {
                    metric: Arc::from(names::DROPPED_ITERATIONS),
                    timestamp: due_at,
                    value: 1.0,
                    tags: SampleTags::default(),
                };
                if let Err(err) = context.recorder().append(MetricKind::Counter, &dropped) {
                    context.fail(&AppError::from(err));
                }
            }
        }
        Ok(())
    }
}

fn start_once(
    pool: &Arc<VuPool>,
    context: &Arc<IterationContext>,
    vu: VirtualUser,
) -> AppResult<()> {
    let vu_context = Arc::clone(context);
    pool.start(vu, move |vu| run_once(vu, vu_context))?;
    Ok(())
}

#[async_trait]
impl Executor for OpenModelExecutor {
    fn kind(&self) -> ExecutorKind {
        self.kind
    }

    async fn run(
        &self,
        pool: Arc<VuPool>,
        context: Arc<IterationContext>,
        mut shutdown_rx: ShutdownReceiver,
    ) -> AppResult<ExecutorReport> {
        let started_at = Instant::now();
        let started_unix = unix_seconds();
        let total = self.schedule.total_duration();
        let unit_secs = self.time_unit.as_secs_f64();
        let stage_count = self.schedule.stages().len();
        let mut pacing = Pacing::default();
        let mut credit = 0.0_f64;
        let mut accounted = Duration::ZERO;
        let mut current_stage: Option<usize> = None;

        loop {
            let now = started_at.elapsed().min(total);
            credit += self.schedule.integral(accounted, now) / unit_secs;
            accounted = now;
            let due_at =
                started_unix.saturating_add(i64::try_from(now.as_secs()).unwrap_or(i64::MAX));
            while credit >= 1.0 {
                credit -= 1.0;
                Self::launch(&pool, &context, due_at, &mut pacing)?;
            }
            if now >= total {
                break;
            }

            let stage = self.schedule.stage_index_at(now);
            if stage != current_stage {
                if let Some(index) = stage {
                    info!(
                        "Stage {}/{} started at {:?}: target {} iterations per {:?}.",
                        index.saturating_add(1),
                        stage_count,
                        now,
                        self.schedule.stages().get(index).map_or(0, |planned| planned.target),
                        self.time_unit
                    );
                }
                current_stage = stage;
            }

            let rate = self.schedule.target_at(now).unwrap_or(0.0);
            let wait = if rate > 0.0 {
                Duration::try_from_secs_f64((1.0 - credit) * unit_secs / rate)
                    .unwrap_or(MAX_WAIT)
                    .clamp(MIN_WAIT, MAX_WAIT)
            } else {
                RATE_RECHECK
            };
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    pacing.report.interrupted = true;
                    break;
                }
                () = sleep(wait) => {}
            }
        }

        let stopping = pool.stop_all()?;
        debug!("{} VUs still finishing their iteration.", stopping);
        pacing.report.elapsed = started_at.elapsed();
        info!(
            "{} finished after {:?} ({} iterations started, {} dropped, pool {} VUs).",
            self.kind,
            pacing.report.elapsed,
            pacing.report.started,
            pacing.report.dropped,
            pool.cap()
        );
        Ok(pacing.report)
    }
}
