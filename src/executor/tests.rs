use super::*;
use crate::domain::{PoolBounds, RunOptions, Schedule, Stage};
use crate::error::{AppError, AppResult};
use crate::metrics::{DEFAULT_PERCENTILES, SampleRecorder, names};
use crate::shutdown::ShutdownSender;
use crate::vu::{VirtualUser, VuPool};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::run(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

struct SleepyIteration {
    pause: Duration,
    calls: AtomicU64,
    cancelled: AtomicU64,
    fail: bool,
}

impl SleepyIteration {
    fn new(pause: Duration) -> Arc<Self> {
        Arc::new(Self {
            pause,
            calls: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            fail: false,
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IterationCallback for SleepyIteration {
    async fn run(&self, _vu: &VirtualUser, _recorder: &SampleRecorder) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.pause).await;
        if self.fail {
            return Err(AppError::run("scripted failure"));
        }
        Ok(())
    }

    fn on_cancel(&self, _vu: &VirtualUser, _recorder: &SampleRecorder, _elapsed: Duration) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    pool: Arc<VuPool>,
    context: Arc<IterationContext>,
    recorder: Arc<SampleRecorder>,
    shutdown_tx: ShutdownSender,
}

fn harness(callback: Arc<SleepyIteration>, bounds: PoolBounds) -> AppResult<Harness> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let recorder = Arc::new(SampleRecorder::new(None));
    let pool = Arc::new(VuPool::new(bounds));
    pool.preallocate(bounds.pre_allocated)?;
    let context = Arc::new(IterationContext::new(
        callback,
        Arc::clone(&recorder),
        &RunOptions::default(),
        &shutdown_tx,
    ));
    Ok(Harness {
        pool,
        context,
        recorder,
        shutdown_tx,
    })
}

fn iterations_recorded(recorder: &SampleRecorder) -> AppResult<u64> {
    Ok(recorder
        .snapshot(names::ITERATIONS, &DEFAULT_PERCENTILES)?
        .map_or(0, |stats| stats.count))
}

#[test]
fn closed_model_bounds_iterations_by_vus() -> AppResult<()> {
    run_async_test(async {
        let callback = SleepyIteration::new(Duration::from_millis(50));
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 3,
                max: 3,
            },
        )?;
        let executor = ClosedModelExecutor::new(
            ExecutorKind::ConstantVus,
            Schedule::constant(3, Duration::from_millis(300)),
        )
        .with_tick(Duration::from_millis(10));
        let report = executor
            .run(
                Arc::clone(&setup.pool),
                Arc::clone(&setup.context),
                setup.shutdown_tx.subscribe(),
            )
            .await?;
        let drained = setup.pool.shutdown(Duration::from_secs(1)).await?;
        setup.pool.check_invariants()?;

        if report.started != 3 || report.interrupted || !drained.drained {
            return Err(AppError::run(format!(
                "Unexpected report {:?} / {:?}",
                report, drained
            )));
        }
        let calls = callback.calls();
        // Three VUs at 50ms each over 300ms, plus the iteration in flight at the end.
        if !(9..=24).contains(&calls) {
            return Err(AppError::run(format!("Unexpected iteration count {}", calls)));
        }
        let recorded = iterations_recorded(&setup.recorder)?;
        if recorded == calls {
            Ok(())
        } else {
            Err(AppError::run(format!(
                "Recorded {} iterations, callback saw {}",
                recorded, calls
            )))
        }
    })
}

#[test]
fn ramping_vus_follow_the_schedule() -> AppResult<()> {
    run_async_test(async {
        let callback = SleepyIteration::new(Duration::from_millis(5));
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 4,
                max: 4,
            },
        )?;
        let schedule = Schedule::new(
            0,
            vec![
                Stage {
                    duration: Duration::from_millis(100),
                    target: 4,
                },
                Stage {
                    duration: Duration::from_millis(100),
                    target: 4,
                },
            ],
        );
        let executor = ClosedModelExecutor::new(ExecutorKind::RampingVus, schedule)
            .with_tick(Duration::from_millis(10));
        let report = executor
            .run(
                Arc::clone(&setup.pool),
                Arc::clone(&setup.context),
                setup.shutdown_tx.subscribe(),
            )
            .await?;
        setup.pool.shutdown(Duration::from_secs(1)).await?;
        setup.pool.check_invariants()?;

        if report.started < 4 || setup.pool.running() != 0 {
            return Err(AppError::run(format!("Unexpected report {:?}", report)));
        }
        if report.elapsed < Duration::from_millis(200) || report.elapsed > Duration::from_secs(1) {
            return Err(AppError::run(format!(
                "Schedule should end near 200ms, took {:?}",
                report.elapsed
            )));
        }
        Ok(())
    })
}

#[test]
fn ramp_down_keeps_running_vus_near_the_target() -> AppResult<()> {
    run_async_test(async {
        let tick = Duration::from_millis(10);
        let callback = SleepyIteration::new(Duration::from_millis(5));
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 4,
                max: 4,
            },
        )?;
        let schedule = Schedule::new(
            4,
            vec![
                Stage {
                    duration: Duration::from_millis(100),
                    target: 4,
                },
                Stage {
                    duration: Duration::from_millis(200),
                    target: 0,
                },
            ],
        );
        // Stopping VUs finish their current iteration, so allow one tick of
        // ramp plus the iteration they are in.
        let slack = schedule.max_step(tick.saturating_mul(3));
        let executor =
            ClosedModelExecutor::new(ExecutorKind::RampingVus, schedule.clone()).with_tick(tick);
        let started = tokio::time::Instant::now();
        let task = {
            let pool = Arc::clone(&setup.pool);
            let context = Arc::clone(&setup.context);
            let shutdown_rx = setup.shutdown_tx.subscribe();
            tokio::spawn(async move { executor.run(pool, context, shutdown_rx).await })
        };

        let mut peak: usize = 0;
        while !task.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let elapsed = started.elapsed();
            let running = setup.pool.running();
            peak = peak.max(running);
            let Some(target) = schedule.value_at(elapsed.saturating_sub(tick)) else {
                break;
            };
            let allowed = usize::try_from(target.saturating_add(slack)).unwrap_or(usize::MAX);
            if running > allowed {
                return Err(AppError::run(format!(
                    "{} VUs running at {:?}, target allows {}",
                    running, elapsed, allowed
                )));
            }
        }
        let report = task.await??;
        setup.pool.shutdown(Duration::from_secs(1)).await?;
        setup.pool.check_invariants()?;

        if peak < 4 || report.started < 4 {
            return Err(AppError::run(format!(
                "Expected the pool to reach 4 VUs first, peak {} / {:?}",
                peak, report
            )));
        }
        Ok(())
    })
}

#[test]
fn open_model_launches_at_the_target_rate() -> AppResult<()> {
    run_async_test(async {
        let callback = SleepyIteration::new(Duration::from_millis(5));
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 5,
                max: 10,
            },
        )?;
        let executor = OpenModelExecutor::new(
            ExecutorKind::ConstantArrivalRate,
            Schedule::constant(50, Duration::from_millis(400)),
            Duration::from_secs(1),
        );
        let report = executor
            .run(
                Arc::clone(&setup.pool),
                Arc::clone(&setup.context),
                setup.shutdown_tx.subscribe(),
            )
            .await?;
        setup.pool.shutdown(Duration::from_secs(1)).await?;
        setup.pool.check_invariants()?;

        // 50 per second over 400ms is 20 arrivals.
        if !(18..=20).contains(&report.started) || report.dropped != 0 {
            return Err(AppError::run(format!("Unexpected report {:?}", report)));
        }
        let recorded = iterations_recorded(&setup.recorder)?;
        if recorded == report.started {
            Ok(())
        } else {
            Err(AppError::run(format!(
                "Recorded {} iterations for {} arrivals",
                recorded, report.started
            )))
        }
    })
}

#[test]
fn saturated_open_model_drops_arrivals() -> AppResult<()> {
    run_async_test(async {
        let callback = SleepyIteration::new(Duration::from_secs(5));
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 1,
                max: 2,
            },
        )?;
        let executor = OpenModelExecutor::new(
            ExecutorKind::ConstantArrivalRate,
            Schedule::constant(100, Duration::from_millis(300)),
            Duration::from_secs(1),
        );
        let report = executor
            .run(
                Arc::clone(&setup.pool),
                Arc::clone(&setup.context),
                setup.shutdown_tx.subscribe(),
            )
            .await?;
        let cancelled = setup.pool.shutdown(Duration::from_millis(20)).await?;
        setup.pool.check_invariants()?;

        if report.started != 2
            || report.dropped < 20
            || cancelled.aborted != 2
            || callback.cancelled() != 2
        {
            return Err(AppError::run(format!(
                "Unexpected report {:?} / {:?}",
                report, cancelled
            )));
        }
        let dropped = setup
            .recorder
            .snapshot(names::DROPPED_ITERATIONS, &DEFAULT_PERCENTILES)?
            .ok_or_else(|| AppError::run("Missing dropped_iterations stream"))?;
        if dropped.count == report.dropped {
            Ok(())
        } else {
            Err(AppError::run(format!(
                "Recorded {} drops, executor counted {}",
                dropped.count, report.dropped
            )))
        }
    })
}

#[test]
fn shutdown_interrupts_the_schedule() -> AppResult<()> {
    run_async_test(async {
        let callback = SleepyIteration::new(Duration::from_millis(5));
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 2,
                max: 2,
            },
        )?;
        let executor = ClosedModelExecutor::new(
            ExecutorKind::ConstantVus,
            Schedule::constant(2, Duration::from_secs(30)),
        )
        .with_tick(Duration::from_millis(10));
        let trigger = setup.shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(trigger.send(()));
        });
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            executor.run(
                Arc::clone(&setup.pool),
                Arc::clone(&setup.context),
                setup.shutdown_tx.subscribe(),
            ),
        )
        .await
        .map_err(|err| AppError::run(format!("Executor ignored shutdown: {}", err)))??;
        setup.pool.shutdown(Duration::from_secs(1)).await?;

        if report.interrupted && report.elapsed < Duration::from_secs(5) {
            Ok(())
        } else {
            Err(AppError::run(format!("Unexpected report {:?}", report)))
        }
    })
}

#[test]
fn iteration_error_stops_the_run() -> AppResult<()> {
    run_async_test(async {
        let callback = Arc::new(SleepyIteration {
            pause: Duration::from_millis(1),
            calls: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            fail: true,
        });
        let setup = harness(
            Arc::clone(&callback),
            PoolBounds {
                pre_allocated: 1,
                max: 1,
            },
        )?;
        let mut watcher = setup.shutdown_tx.subscribe();
        let executor = ClosedModelExecutor::new(
            ExecutorKind::ConstantVus,
            Schedule::constant(1, Duration::from_secs(30)),
        )
        .with_tick(Duration::from_millis(10));
        let report = tokio::time::timeout(
            Duration::from_secs(5),
            executor.run(
                Arc::clone(&setup.pool),
                Arc::clone(&setup.context),
                setup.shutdown_tx.subscribe(),
            ),
        )
        .await
        .map_err(|err| AppError::run(format!("Executor kept running: {}", err)))??;
        setup.pool.shutdown(Duration::from_secs(1)).await?;

        if matches!(watcher.try_recv(), Err(TryRecvError::Empty)) {
            return Err(AppError::run("Failure should broadcast shutdown"));
        }
        match setup.context.failure() {
            Some(message) if message.contains("scripted failure") && report.interrupted => Ok(()),
            other => Err(AppError::run(format!(
                "Unexpected failure {:?} / {:?}",
                other, report
            ))),
        }
    })
}

#[test]
fn executor_matches_configured_model() -> AppResult<()> {
    let open = build_executor(&crate::domain::ExecutorConfig::ConstantArrivalRate {
        rate: 10,
        time_unit: Duration::from_secs(1),
        duration: Duration::from_secs(1),
        pre_allocated_vus: 1,
        max_vus: 2,
    });
    let closed = build_executor(&crate::domain::ExecutorConfig::ConstantVus {
        vus: 2,
        duration: Duration::from_secs(1),
    });
    if open.kind() == ExecutorKind::ConstantArrivalRate && closed.kind() == ExecutorKind::ConstantVus
    {
        Ok(())
    } else {
        Err(AppError::run("Executor kinds do not match their configs"))
    }
}
