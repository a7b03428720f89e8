use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::MetricKind;

/// Thousandths of a percent in one whole (100%).
const PERCENTILE_FULL: u32 = 100_000;
const PERCENTILE_FRACTION_DIGITS: usize = 3;
const THOUSANDTHS_PER_PERCENT: u32 = 1000;

/// A percentile stored as thousandths of a percent, so `p(99.9)` is `99_900`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percentile(u32);

impl Percentile {
    pub const P50: Percentile = Percentile(50_000);
    pub const P90: Percentile = Percentile(90_000);
    pub const P95: Percentile = Percentile(95_000);
    pub const P99: Percentile = Percentile(99_000);
    pub const P99_9: Percentile = Percentile(99_900);

    #[must_use]
    pub const fn from_thousandths(value: u32) -> Option<Self> {
        if value == 0 || value > PERCENTILE_FULL {
            None
        } else {
            Some(Self(value))
        }
    }

    #[must_use]
    pub fn quantile(self) -> f64 {
        f64::from(self.0) / f64::from(PERCENTILE_FULL)
    }
}

/// Percentiles every trend summary carries.
pub const DEFAULT_PERCENTILES: [Percentile; 5] = [
    Percentile::P50,
    Percentile::P90,
    Percentile::P95,
    Percentile::P99,
    Percentile::P99_9,
];

impl FromStr for Percentile {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidPercentile {
            value: s.to_owned(),
        };
        let trimmed = s.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty()
            || fraction.len() > PERCENTILE_FRACTION_DIGITS
            || !whole.chars().all(|ch| ch.is_ascii_digit())
            || !fraction.chars().all(|ch| ch.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u32 = whole.parse().map_err(|_parse| invalid())?;
        let mut padded = fraction.to_owned();
        while padded.len() < PERCENTILE_FRACTION_DIGITS {
            padded.push('0');
        }
        let fraction: u32 = padded.parse().map_err(|_parse| invalid())?;
        let value = whole
            .checked_mul(THOUSANDTHS_PER_PERCENT)
            .and_then(|value| value.checked_add(fraction))
            .ok_or_else(invalid)?;
        Percentile::from_thousandths(value).ok_or_else(invalid)
    }
}

impl fmt::Display for Percentile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / THOUSANDTHS_PER_PERCENT;
        let fraction = self.0 % THOUSANDTHS_PER_PERCENT;
        if fraction == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:03}", fraction);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// A named statistic of a summarized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKey {
    Avg,
    Min,
    Med,
    Max,
    /// Sample count; the running total for counters.
    Count,
    /// Pass ratio for rates; per-second throughput for counters.
    Rate,
    /// Last observed value (gauges).
    Value,
    Percentile(Percentile),
}

/// Trend columns shown in the report when none are configured.
pub const DEFAULT_TREND_STATS: [StatKey; 8] = [
    StatKey::Avg,
    StatKey::Min,
    StatKey::Med,
    StatKey::Max,
    StatKey::Percentile(Percentile::P90),
    StatKey::Percentile(Percentile::P95),
    StatKey::Percentile(Percentile::P99),
    StatKey::Percentile(Percentile::P99_9),
];

impl FromStr for StatKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "avg" => Ok(StatKey::Avg),
            "min" => Ok(StatKey::Min),
            "med" => Ok(StatKey::Med),
            "max" => Ok(StatKey::Max),
            "count" => Ok(StatKey::Count),
            "rate" => Ok(StatKey::Rate),
            "value" => Ok(StatKey::Value),
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ConfigError::UnknownSummaryStat {
                        value: s.to_owned(),
                    })?;
                Ok(StatKey::Percentile(inner.parse()?))
            }
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatKey::Avg => f.write_str("avg"),
            StatKey::Min => f.write_str("min"),
            StatKey::Med => f.write_str("med"),
            StatKey::Max => f.write_str("max"),
            StatKey::Count => f.write_str("count"),
            StatKey::Rate => f.write_str("rate"),
            StatKey::Value => f.write_str("value"),
            StatKey::Percentile(percentile) => write!(f, "p({})", percentile),
        }
    }
}

/// Immutable summary of one metric stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub name: String,
    pub kind: MetricKind,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub percentiles: BTreeMap<Percentile, f64>,
    /// Samples with a non-zero value (rates).
    pub passes: u64,
    /// Pass ratio for rates, per-second total for counters, zero otherwise.
    pub rate: f64,
    /// Last recorded value.
    pub last: f64,
    /// Sample counts per `status` tag.
    pub statuses: BTreeMap<u16, u64>,
}

impl SummaryStats {
    /// Summary of a stream that never received a sample.
    #[must_use]
    pub fn empty(name: &str, kind: MetricKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
            avg: 0.0,
            median: 0.0,
            percentiles: BTreeMap::new(),
            passes: 0,
            rate: 0.0,
            last: 0.0,
            statuses: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn fails(&self) -> u64 {
        self.count.saturating_sub(self.passes)
    }

    /// Look up a statistic; `None` when it does not apply to this stream.
    #[must_use]
    pub fn stat(&self, key: StatKey) -> Option<f64> {
        match key {
            StatKey::Avg => Some(self.avg),
            StatKey::Min => Some(self.min),
            StatKey::Med => Some(self.median),
            StatKey::Max => Some(self.max),
            StatKey::Count => match self.kind {
                MetricKind::Counter => Some(self.sum),
                MetricKind::Trend | MetricKind::Rate | MetricKind::Gauge => {
                    Some(self.count as f64)
                }
            },
            StatKey::Rate => match self.kind {
                MetricKind::Rate | MetricKind::Counter => Some(self.rate),
                MetricKind::Trend | MetricKind::Gauge => None,
            },
            StatKey::Value => Some(self.last),
            StatKey::Percentile(percentile) => {
                if self.count == 0 {
                    return Some(0.0);
                }
                self.percentiles.get(&percentile).copied()
            }
        }
    }
}
