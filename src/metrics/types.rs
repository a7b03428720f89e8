use std::fmt;
use std::sync::Arc;

/// Semantics of a metric stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Distribution of continuous values (latencies, durations).
    Trend,
    /// Ratio of non-zero samples to all samples.
    Rate,
    /// Monotonically increasing total.
    Counter,
    /// Point-in-time value; the last sample wins.
    Gauge,
}

impl MetricKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::Trend => "trend",
            MetricKind::Rate => "rate",
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request produced no usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestErrorKind {
    Timeout,
    Transport,
}

impl RequestErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestErrorKind::Timeout => "timeout",
            RequestErrorKind::Transport => "transport",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleTags {
    pub status: Option<u16>,
    pub method: Option<&'static str>,
    pub url: Option<Arc<str>>,
    pub error: Option<RequestErrorKind>,
}

impl SampleTags {
    #[must_use]
    pub fn request(method: &'static str, url: &Arc<str>, status: u16) -> Self {
        Self {
            status: Some(status),
            method: Some(method),
            url: Some(Arc::clone(url)),
            error: None,
        }
    }

    #[must_use]
    pub const fn with_error(mut self, error: Option<RequestErrorKind>) -> Self {
        self.error = error;
        self
    }
}

/// One recorded observation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Arc<str>,
    pub timestamp: i64,
    pub value: f64,
    pub tags: SampleTags,
}

/// One line of the per-request log, in output field order.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLine {
    pub timestamp: i64,
    pub url: Arc<str>,
    pub method: &'static str,
    pub status: u16,
    pub response_time_ms: f64,
    pub body_size: u64,
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{:.3},{}",
            self.timestamp,
            self.url,
            self.method,
            self.status,
            self.response_time_ms,
            self.body_size
        )
    }
}

/// Current wall-clock time in whole Unix seconds.
#[must_use]
pub fn unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
