use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::MetricsError;

use super::histogram::TrendHistogram;
use super::summary::{Percentile, SummaryStats};
use super::MetricKind;

/// Running reduction of one metric stream.
///
/// Every update is O(1) and order independent, so samples from many VUs can
/// be folded in any interleaving. Only trend streams carry a histogram.
#[derive(Debug, Clone)]
pub struct StreamAggregate {
    kind: MetricKind,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    passes: u64,
    last: f64,
    last_timestamp: i64,
    statuses: BTreeMap<u16, u64>,
    histogram: Option<TrendHistogram>,
}

impl StreamAggregate {
    /// # Errors
    ///
    /// Returns an error if the trend histogram cannot be created.
    pub fn new(kind: MetricKind) -> Result<Self, MetricsError> {
        let histogram = match kind {
            MetricKind::Trend => Some(TrendHistogram::new()?),
            MetricKind::Rate | MetricKind::Counter | MetricKind::Gauge => None,
        };
        Ok(Self {
            kind,
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            passes: 0,
            last: 0.0,
            last_timestamp: i64::MIN,
            statuses: BTreeMap::new(),
            histogram,
        })
    }

    #[must_use]
    pub const fn kind(&self) -> MetricKind {
        self.kind
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Fold one value into the aggregate, counting its status tag if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram rejects the value.
    pub fn push(
        &mut self,
        value: f64,
        timestamp: i64,
        status: Option<u16>,
    ) -> Result<(), MetricsError> {
        if let Some(histogram) = self.histogram.as_mut() {
            histogram.record(value)?;
        }
        self.count = self.count.saturating_add(1);
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if value != 0.0 {
            self.passes = self.passes.saturating_add(1);
        }
        if let Some(status) = status {
            let entry = self.statuses.entry(status).or_insert(0);
            *entry = entry.saturating_add(1);
        }
        // Gauges keep the most recent value; ties keep arrival order.
        if timestamp >= self.last_timestamp {
            self.last = value;
            self.last_timestamp = timestamp;
        }
        Ok(())
    }

    /// Summarize the aggregate. `elapsed` scales counter throughput.
    #[must_use]
    pub fn summarize(
        &self,
        name: &str,
        elapsed: Duration,
        percentiles: &[Percentile],
    ) -> SummaryStats {
        if self.count == 0 {
            return SummaryStats::empty(name, self.kind);
        }
        let count_f = self.count as f64;
        let avg = self.sum / count_f;
        let mut quantiles = BTreeMap::new();
        let median = match self.histogram.as_ref() {
            Some(histogram) => {
                for percentile in percentiles {
                    let value = self.clamp(histogram.value_at_quantile(percentile.quantile()));
                    quantiles.insert(*percentile, value);
                }
                self.clamp(histogram.value_at_quantile(Percentile::P50.quantile()))
            }
            None => avg,
        };
        let rate = match self.kind {
            MetricKind::Rate => self.passes as f64 / count_f,
            MetricKind::Counter => {
                let secs = elapsed.as_secs_f64();
                if secs > 0.0 { self.sum / secs } else { 0.0 }
            }
            MetricKind::Trend | MetricKind::Gauge => 0.0,
        };

        SummaryStats {
            name: name.to_owned(),
            kind: self.kind,
            count: self.count,
            sum: self.sum,
            min: self.min,
            max: self.max,
            avg,
            median,
            percentiles: quantiles,
            passes: self.passes,
            rate,
            last: self.last,
            statuses: self.statuses.clone(),
        }
    }

    /// Bucketed quantiles may land just above the exact extremes.
    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}
