//! Scheduling strategies that turn a stage plan into running iterations.
mod closed;
mod iteration;
mod open;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExecutorConfig, ExecutorKind};
use crate::error::AppResult;
use crate::shutdown::ShutdownReceiver;
use crate::vu::VuPool;

pub use closed::{CONTROL_TICK, ClosedModelExecutor};
pub use iteration::{IterationCallback, IterationContext};
pub use open::OpenModelExecutor;

/// What an executor did before its schedule ran out or the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorReport {
    /// Time spent driving the schedule.
    pub elapsed: Duration,
    /// Stopped by a shutdown signal before the last stage ended.
    pub interrupted: bool,
    /// Iterations (open model) or VU loops (closed model) started.
    pub started: u64,
    /// Open-model arrivals dropped because the pool was at its maximum.
    pub dropped: u64,
}

#[async_trait]
pub trait Executor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    /// Drive the schedule against `pool` until it ends or `shutdown_rx`
    /// fires. On return every VU this executor started has been asked to
    /// stop; draining them is left to the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool reports an invariant violation.
    async fn run(
        &self,
        pool: Arc<VuPool>,
        context: Arc<IterationContext>,
        shutdown_rx: ShutdownReceiver,
    ) -> AppResult<ExecutorReport>;
}

/// Pick the executor for a scenario.
#[must_use]
pub fn build_executor(config: &ExecutorConfig) -> Box<dyn Executor> {
    match config.time_unit() {
        Some(time_unit) => Box::new(OpenModelExecutor::new(
            config.kind(),
            config.schedule(),
            time_unit,
        )),
        None => Box::new(ClosedModelExecutor::new(config.kind(), config.schedule())),
    }
}
