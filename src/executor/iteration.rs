use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::domain::RunOptions;
use crate::error::{AppError, AppResult};
use crate::metrics::{MetricKind, SampleRecorder, SampleTags, names};
use crate::shutdown::ShutdownSender;
use crate::vu::VirtualUser;

/// One unit of work per VU iteration. It may do arbitrary I/O and record
/// samples; the executor only observes its timing.
#[async_trait]
pub trait IterationCallback: Send + Sync {
    /// # Errors
    ///
    /// Returns an error only for conditions that must end the run; failed
    /// requests are recorded as samples instead.
    async fn run(&self, vu: &VirtualUser, recorder: &SampleRecorder) -> AppResult<()>;

    /// Called when an iteration is cut off before `run` returned, by the
    /// iteration timeout or by cancellation at shutdown. Whatever `run` had
    /// in flight should be recorded as failed here.
    fn on_cancel(&self, _vu: &VirtualUser, _recorder: &SampleRecorder, _elapsed: Duration) {}
}

/// Reports an iteration to [`IterationCallback::on_cancel`] if it is
/// dropped before being disarmed.
struct InFlight<'iter> {
    callback: &'iter dyn IterationCallback,
    recorder: &'iter SampleRecorder,
    vu: &'iter VirtualUser,
    started: Instant,
    armed: bool,
}

impl InFlight<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.callback
                .on_cancel(self.vu, self.recorder, self.started.elapsed());
        }
    }
}

/// Everything a VU needs to run iterations, shared by all VUs of a run.
pub struct IterationContext {
    callback: Arc<dyn IterationCallback>,
    recorder: Arc<SampleRecorder>,
    iteration_timeout: Duration,
    think_time: Option<Duration>,
    shutdown_tx: ShutdownSender,
    failure: Mutex<Option<String>>,
}

impl std::fmt::Debug for IterationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationContext")
            .field("iteration_timeout", &self.iteration_timeout)
            .field("think_time", &self.think_time)
            .finish_non_exhaustive()
    }
}

impl IterationContext {
    #[must_use]
    pub fn new(
        callback: Arc<dyn IterationCallback>,
        recorder: Arc<SampleRecorder>,
        options: &RunOptions,
        shutdown_tx: &ShutdownSender,
    ) -> Self {
        Self {
            callback,
            recorder,
            iteration_timeout: options.iteration_timeout,
            think_time: options.think_time,
            shutdown_tx: shutdown_tx.clone(),
            failure: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn recorder(&self) -> &SampleRecorder {
        &self.recorder
    }

    /// Run one iteration on `vu`, bounded by the iteration timeout, then
    /// pause for the think time.
    pub async fn run_iteration(&self, vu: &mut VirtualUser) {
        let started = Instant::now();
        let in_flight = InFlight {
            callback: self.callback.as_ref(),
            recorder: &self.recorder,
            vu: &*vu,
            started,
            armed: true,
        };
        let outcome = tokio::time::timeout(
            self.iteration_timeout,
            self.callback.run(in_flight.vu, &self.recorder),
        )
        .await;
        match outcome {
            Ok(Ok(())) => {
                in_flight.disarm();
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                let tags = SampleTags::default();
                let recorded = self
                    .recorder
                    .record(names::ITERATIONS, MetricKind::Counter, 1.0, &tags)
                    .and_then(|()| {
                        self.recorder.record(
                            names::ITERATION_DURATION,
                            MetricKind::Trend,
                            elapsed_ms,
                            &tags,
                        )
                    });
                if let Err(err) = recorded {
                    self.fail(&AppError::from(err));
                }
                vu.complete_iteration();
            }
            Ok(Err(err)) => {
                in_flight.disarm();
                self.fail(&err);
            }
            Err(_elapsed) => {
                drop(in_flight);
                debug!(
                    "VU {} iteration cancelled after {:?}.",
                    vu.index(),
                    self.iteration_timeout
                );
            }
        }
        if let Some(think_time) = self.think_time
            && !vu.control().should_stop()
        {
            tokio::time::sleep(think_time).await;
        }
    }

    /// Remember the first fatal iteration error and stop the run.
    pub fn fail(&self, err: &AppError) {
        error!("Iteration failed: {}", err);
        if let Ok(mut failure) = self.failure.lock()
            && failure.is_none()
        {
            *failure = Some(err.to_string());
        }
        drop(self.shutdown_tx.send(()));
    }

    /// First fatal iteration error, if any.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|failure| failure.clone())
    }
}

/// Closed-model VU body: iterate back-to-back until asked to stop.
pub(super) async fn run_until_stopped(
    mut vu: VirtualUser,
    context: Arc<IterationContext>,
) -> VirtualUser {
    while !vu.control().should_stop() {
        context.run_iteration(&mut vu).await;
        // Iterations that never wait must still let the control tick run.
        tokio::task::yield_now().await;
    }
    vu
}

/// Open-model VU body: exactly one iteration.
pub(super) async fn run_once(mut vu: VirtualUser, context: Arc<IterationContext>) -> VirtualUser {
    context.run_iteration(&mut vu).await;
    vu
}
