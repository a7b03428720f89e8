use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::domain::{ExecutorKind, Schedule};
use crate::error::AppResult;
use crate::shutdown::ShutdownReceiver;
use crate::vu::{VuControl, VuPool};

use super::iteration::{IterationContext, run_until_stopped};
use super::{Executor, ExecutorReport};

/// How often closed-model executors reconcile live VUs with the target.
pub const CONTROL_TICK: Duration = Duration::from_millis(100);

/// Constant or ramping VUs: each VU loops iterations back-to-back.
#[derive(Debug, Clone)]
pub struct ClosedModelExecutor {
    kind: ExecutorKind,
    schedule: Schedule,
    tick: Duration,
}

impl ClosedModelExecutor {
    #[must_use]
    pub const fn new(kind: ExecutorKind, schedule: Schedule) -> Self {
        Self {
            kind,
            schedule,
            tick: CONTROL_TICK,
        }
    }

    #[must_use]
    pub const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

#[async_trait]
impl Executor for ClosedModelExecutor {
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
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Most recently started VU last; scale-down stops from the back.
        let mut active: Vec<Arc<VuControl>> = Vec::new();
        let mut report = ExecutorReport::default();
        let mut current_stage: Option<usize> = None;
        let stage_count = self.schedule.stages().len();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    report.interrupted = true;
                    break;
                }
                _ = ticker.tick() => {}
            }

            let elapsed = started_at.elapsed();
            let Some(target) = self.schedule.value_at(elapsed) else {
                break;
            };
            let stage = self.schedule.stage_index_at(elapsed);
            if stage != current_stage {
                if let Some(index) = stage {
                    info!(
                        "Stage {}/{} started at {:?}: target {} VUs.",
                        index.saturating_add(1),
                        stage_count,
                        elapsed,
                        self.schedule.stages().get(index).map_or(0, |planned| planned.target)
                    );
                }
                current_stage = stage;
            }

            let target = usize::try_from(target).unwrap_or(usize::MAX);
            active.retain(|control| !control.should_stop());
            while active.len() > target {
                if let Some(control) = active.pop() {
                    control.request_stop();
                }
            }
            while active.len() < target {
                let vu = match pool.acquire() {
                    Ok(vu) => vu,
                    Err(busy) => {
                        // Stopped VUs are still finishing their iteration.
                        debug!("{}; retrying next tick.", busy);
                        break;
                    }
                };
                let control = Arc::clone(vu.control());
                let vu_context = Arc::clone(&context);
                pool.start(vu, move |vu| run_until_stopped(vu, vu_context))?;
                active.push(control);
                report.started = report.started.saturating_add(1);
            }
        }

        for control in active {
            control.request_stop();
        }
        report.elapsed = started_at.elapsed();
        info!(
            "{} finished after {:?} ({} VU loops started).",
            self.kind, report.elapsed, report.started
        );
        Ok(report)
    }
}
