//! Sample recording, per-stream aggregation, and summary statistics.
mod histogram;
mod logging;
mod recorder;
mod stream;
mod summary;
mod types;


pub use histogram::{SIGNIFICANT_DIGITS, TrendHistogram};
pub use logging::{
    SAMPLE_LOG_HEADER, SampleLog, SampleLogHandle, SampleLogTarget, setup_sample_logger,
};
pub use recorder::{FrozenMetrics, SampleRecorder};
pub use stream::StreamAggregate;
pub use summary::{DEFAULT_PERCENTILES, DEFAULT_TREND_STATS, Percentile, StatKey, SummaryStats};
pub use types::{MetricKind, RequestErrorKind, RequestLine, Sample, SampleTags, unix_seconds};

/// Names of the built-in metric streams.
pub mod names {
    use super::MetricKind;

    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const CHECKS: &str = "checks";
    pub const ERRORS: &str = "errors";
    pub const DATA_RECEIVED: &str = "data_received";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
    pub const VUS: &str = "vus";
    pub const VUS_MAX: &str = "vus_max";

    /// Kind of a built-in stream, `None` for any other name.
    #[must_use]
    pub fn builtin_kind(name: &str) -> Option<MetricKind> {
        match name {
            HTTP_REQ_DURATION | ITERATION_DURATION => Some(MetricKind::Trend),
            HTTP_REQ_FAILED | CHECKS | ERRORS => Some(MetricKind::Rate),
            HTTP_REQS | DATA_RECEIVED | ITERATIONS | DROPPED_ITERATIONS => {
                Some(MetricKind::Counter)
            }
            VUS | VUS_MAX => Some(MetricKind::Gauge),
            _ => None,
        }
    }
}
