//! Scenario model shared by configuration, executors, and the run controller.
mod scenario;
mod schedule;


pub use scenario::{
    DEFAULT_EXPECTED_STATUS, DEFAULT_GRACEFUL_STOP, DEFAULT_ITERATION_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SAMPLE_LOG_BUFFER, DEFAULT_TIME_UNIT, ExecutorConfig,
    ExecutorKind, PoolBounds, RunOptions, ScenarioConfig, TargetConfig,
};
pub use schedule::{Schedule, Stage};
