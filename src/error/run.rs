use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Internal invariant violated: {detail}")]
    InvariantViolation { detail: String },
    #[error("{failed} threshold(s) failed.")]
    ThresholdsFailed { failed: usize },
    #[error("Run aborted: threshold '{expression}' on '{metric}' failed (observed {observed}).")]
    ThresholdAbort {
        metric: String,
        expression: String,
        observed: f64,
    },
    #[error("Iteration failed: {detail}")]
    IterationFailed { detail: String },
    #[error("Executor task failed: {source}")]
    ExecutorJoin {
        #[source]
        source: tokio::task::JoinError,
    },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}

/// Returned by `VuPool::acquire` when every VU up to the current cap is busy.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("VU pool exhausted ({running} running, cap {cap}).")]
pub struct CapacityExceeded {
    pub running: usize,
    pub cap: usize,
}
