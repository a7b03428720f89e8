use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::domain::ScenarioConfig;
use crate::error::{AppError, AppResult, RunError};
use crate::executor::{
    CONTROL_TICK, ExecutorReport, IterationCallback, IterationContext, build_executor,
};
use crate::metrics::{
    FrozenMetrics, MetricKind, Percentile, SampleLogTarget, SampleRecorder, SampleTags,
    SummaryStats, names, setup_sample_logger,
};
use crate::shutdown::ShutdownSender;
use crate::thresholds::{ThresholdResult, ThresholdRule, evaluate, evaluate_all};
use crate::vu::{PoolShutdown, VuPool};

/// Everything the report needs once a run is over.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// One summary per recorded stream, sorted by name.
    pub summaries: Vec<SummaryStats>,
    pub thresholds: Vec<ThresholdResult>,
    pub executor: ExecutorReport,
    pub drain: PoolShutdown,
    /// The abort rule that stopped the run early, if any.
    pub abort: Option<ThresholdResult>,
    /// First error raised by an iteration callback.
    pub failure: Option<String>,
    pub elapsed: Duration,
    pub late_samples: u64,
    /// Lines written to the sample log, when one was enabled.
    pub sample_lines: Option<u64>,
}

impl RunOutcome {
    #[must_use]
    pub fn failed_thresholds(&self) -> usize {
        self.thresholds
            .iter()
            .filter(|result| !result.outcome.passed())
            .count()
    }

    /// Overall pass/fail of the run.
    ///
    /// # Errors
    ///
    /// Returns the reason the run failed: an iteration error, an abort
    /// threshold, or failed end-of-run thresholds.
    pub fn verdict(&self) -> Result<(), RunError> {
        if let Some(detail) = self.failure.as_ref() {
            return Err(RunError::IterationFailed {
                detail: detail.clone(),
            });
        }
        if let Some(abort) = self.abort.as_ref() {
            return Err(RunError::ThresholdAbort {
                metric: abort.rule.metric.clone(),
                expression: abort.rule.expr.to_string(),
                observed: abort.outcome.observed().unwrap_or(f64::NAN),
            });
        }
        match self.failed_thresholds() {
            0 => Ok(()),
            failed => Err(RunError::ThresholdsFailed { failed }),
        }
    }
}

/// Drive one scenario end to end: pool, executor, control tick, drain,
/// freeze, summaries, thresholds.
///
/// # Errors
///
/// Returns an error for fatal conditions only: the sample log cannot be
/// opened or overflowed, the pool broke an invariant, or the executor task
/// died. Threshold failures are reported through [`RunOutcome::verdict`].
pub async fn run_scenario(
    scenario: &ScenarioConfig,
    callback: Arc<dyn IterationCallback>,
    sample_log: Option<SampleLogTarget>,
    shutdown_tx: &ShutdownSender,
) -> AppResult<RunOutcome> {
    let options = &scenario.options;
    let percentiles = scenario.percentiles();
    let abort_rules: Vec<ThresholdRule> = scenario.abort_rules().cloned().collect();

    let (log, log_handle) = match sample_log {
        Some(target) => {
            let (log, handle) = setup_sample_logger(target, options.sample_log_buffer).await?;
            (Some(log), Some(handle))
        }
        None => (None, None),
    };
    let recorder = Arc::new(SampleRecorder::new(log));
    let bounds = scenario.executor.pool_bounds();
    let pool = Arc::new(VuPool::new(bounds));
    pool.preallocate(bounds.pre_allocated)?;

    let executor = build_executor(&scenario.executor);
    info!(
        "Starting {} against {} for {:?} ({} VUs pre-allocated, max {}).",
        executor.kind(),
        scenario.target.url,
        scenario.executor.total_duration(),
        bounds.pre_allocated,
        bounds.max
    );

    let context = Arc::new(IterationContext::new(
        callback,
        Arc::clone(&recorder),
        options,
        shutdown_tx,
    ));
    let started_at = Instant::now();
    let mut executor_task = {
        let pool = Arc::clone(&pool);
        let context = Arc::clone(&context);
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { executor.run(pool, context, shutdown_rx).await })
    };

    let mut ticker = interval(CONTROL_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut abort: Option<(ThresholdResult, FrozenMetrics)> = None;
    let mut fatal: Option<AppError> = None;
    let joined = loop {
        tokio::select! {
            joined = &mut executor_task => break joined,
            _ = ticker.tick() => {}
        }
        if fatal.is_some() || abort.is_some() {
            continue;
        }
        match control_tick(&pool, &recorder, &abort_rules, &percentiles) {
            Ok(None) => {}
            Ok(Some(result)) => match recorder.freeze() {
                Ok(frozen) => {
                    warn!(
                        "Threshold '{}: {}' failed (observed {:?}); aborting run.",
                        result.rule.metric,
                        result.rule.expr,
                        result.outcome.observed()
                    );
                    abort = Some((result, frozen));
                    drop(shutdown_tx.send(()));
                }
                Err(err) => {
                    fatal = Some(err.into());
                    drop(shutdown_tx.send(()));
                }
            },
            Err(err) => {
                error!("Stopping run: {}", err);
                fatal = Some(err);
                drop(shutdown_tx.send(()));
            }
        }
    };

    let executor_report = match joined {
        Ok(Ok(report)) => report,
        Ok(Err(err)) => {
            keep_first(&mut fatal, err);
            ExecutorReport::default()
        }
        Err(source) => {
            keep_first(&mut fatal, RunError::ExecutorJoin { source }.into());
            ExecutorReport::default()
        }
    };

    let shutdown_result = pool.shutdown(options.graceful_stop).await;
    let elapsed = started_at.elapsed();
    let drain = match shutdown_result {
        Ok(drain) => {
            if drain.drained {
                info!("All VUs finished within {:?}.", options.graceful_stop);
            } else {
                warn!(
                    "Cancelled {} VUs still running after {:?}.",
                    drain.aborted, options.graceful_stop
                );
            }
            drain
        }
        Err(err) => {
            keep_first(&mut fatal, err.into());
            PoolShutdown {
                drained: false,
                aborted: 0,
            }
        }
    };

    let (abort, frozen) = match abort {
        Some((result, frozen)) => (Some(result), frozen),
        None => (None, recorder.freeze()?),
    };
    if let Err(err) = recorder.health() {
        keep_first(&mut fatal, err.into());
    }
    let sample_lines = match log_handle {
        Some(handle) => Some(handle.finish().await?),
        None => None,
    };
    if let Some(err) = fatal {
        return Err(err);
    }

    let late_samples = recorder.late_samples();
    if late_samples > 0 {
        info!("Discarded {} samples recorded after the run ended.", late_samples);
    }
    let summaries = frozen.summarize(&percentiles);
    let thresholds = evaluate_all(&scenario.thresholds, |name| {
        frozen.summary(name, &percentiles)
    });

    Ok(RunOutcome {
        summaries,
        thresholds,
        executor: executor_report,
        drain,
        abort,
        failure: context.failure(),
        elapsed,
        late_samples,
        sample_lines,
    })
}

/// Periodic run-controller work: VU gauges, pool and sample log health,
/// and abort-on-fail thresholds against live streams.
fn control_tick(
    pool: &VuPool,
    recorder: &SampleRecorder,
    abort_rules: &[ThresholdRule],
    percentiles: &[Percentile],
) -> AppResult<Option<ThresholdResult>> {
    let tags = SampleTags::default();
    recorder.record(names::VUS, MetricKind::Gauge, pool.running() as f64, &tags)?;
    recorder.record(names::VUS_MAX, MetricKind::Gauge, pool.cap() as f64, &tags)?;
    pool.check_invariants()?;
    recorder.health()?;

    for rule in abort_rules {
        // Streams that have not seen a sample yet cannot abort the run.
        let Some(stats) = recorder.snapshot(&rule.metric, percentiles)? else {
            continue;
        };
        let outcome = evaluate(&stats, &rule.expr);
        if !outcome.passed() {
            return Ok(Some(ThresholdResult {
                rule: rule.clone(),
                outcome,
            }));
        }
    }
    Ok(None)
}

fn keep_first(fatal: &mut Option<AppError>, err: AppError) {
    if fatal.is_none() {
        *fatal = Some(err);
    }
}
