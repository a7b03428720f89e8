use hdrhistogram::Histogram;

use crate::error::MetricsError;

/// Significant decimal digits kept by the histogram.
pub const SIGNIFICANT_DIGITS: u8 = 3;
/// Trend values are stored as integer thousandths of their unit.
const SCALE: f64 = 1000.0;

/// Bounded-memory quantile sketch for trend streams.
///
/// Values are quantized to thousandths of their unit and bucketed with
/// three significant digits, so any reported quantile is within 0.1% of
/// the true sample value.
#[derive(Debug, Clone)]
pub struct TrendHistogram {
    hist: Histogram<u64>,
}

impl TrendHistogram {
    /// Create an empty histogram.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be created.
    pub fn new() -> Result<Self, MetricsError> {
        let hist = Histogram::<u64>::new(SIGNIFICANT_DIGITS).map_err(|err| {
            MetricsError::External {
                context: "create trend histogram",
                source: Box::new(err),
            }
        })?;
        Ok(Self { hist })
    }

    /// Record a value. Negative values are clamped to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be recorded.
    pub fn record(&mut self, value: f64) -> Result<(), MetricsError> {
        let scaled = (value.max(0.0) * SCALE).round() as u64;
        self.hist
            .record(scaled)
            .map_err(|err| MetricsError::External {
                context: "record trend value",
                source: Box::new(err),
            })
    }

    /// Value at `quantile` (0.0..=1.0), in the unit values were recorded in.
    #[must_use]
    pub fn value_at_quantile(&self, quantile: f64) -> f64 {
        if self.hist.is_empty() {
            return 0.0;
        }
        self.hist.value_at_quantile(quantile.clamp(0.0, 1.0)) as f64 / SCALE
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.len()
    }
}
