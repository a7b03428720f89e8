use thiserror::Error;

use crate::metrics::MetricKind;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("I/O error during {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("Metrics error during {context}: {source}")]
    External {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Metric '{name}' is a {existing} stream; cannot record it as {requested}.")]
    KindMismatch {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
    #[error("Metric '{name}' received a non-finite value.")]
    NonFiniteValue { name: String },
    #[error("Metric stream lock poisoned ({context}).")]
    LockPoisoned { context: &'static str },
    #[error(
        "Sample log buffer overflowed ({capacity} lines). Raise sample_log_buffer or disable the sample log."
    )]
    SampleLogOverflow { capacity: usize },
    #[error("Sample log writer stopped.")]
    SampleLogClosed,
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
