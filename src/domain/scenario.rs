use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::{DEFAULT_PERCENTILES, Percentile, StatKey};
use crate::thresholds::ThresholdRule;

use super::schedule::{Schedule, Stage};

pub const DEFAULT_EXPECTED_STATUS: u16 = 200;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_SAMPLE_LOG_BUFFER: usize = 65_536;

#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    ConstantVus,
    RampingVus,
    ConstantArrivalRate,
    RampingArrivalRate,
}

impl ExecutorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutorKind::ConstantVus => "constant-vus",
            ExecutorKind::RampingVus => "ramping-vus",
            ExecutorKind::ConstantArrivalRate => "constant-arrival-rate",
            ExecutorKind::RampingArrivalRate => "ramping-arrival-rate",
        }
    }

    #[must_use]
    pub const fn uses_stages(self) -> bool {
        matches!(
            self,
            ExecutorKind::RampingVus | ExecutorKind::RampingArrivalRate
        )
    }

    /// Arrival-rate executors pace iterations independently of VU count.
    #[must_use]
    pub const fn is_open_model(self) -> bool {
        matches!(
            self,
            ExecutorKind::ConstantArrivalRate | ExecutorKind::RampingArrivalRate
        )
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "constant-vus" => Ok(ExecutorKind::ConstantVus),
            "ramping-vus" => Ok(ExecutorKind::RampingVus),
            "constant-arrival-rate" => Ok(ExecutorKind::ConstantArrivalRate),
            "ramping-arrival-rate" => Ok(ExecutorKind::RampingArrivalRate),
            _ => Err(ConfigError::UnknownExecutor {
                value: s.to_owned(),
            }),
        }
    }
}

/// Endpoint every iteration hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub url: String,
    pub expected_status: u16,
    pub discard_response_bodies: bool,
}

/// Scheduling strategy and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorConfig {
    ConstantVus {
        vus: u64,
        duration: Duration,
    },
    RampingVus {
        start_vus: u64,
        stages: Vec<Stage>,
    },
    ConstantArrivalRate {
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        pre_allocated_vus: usize,
        max_vus: usize,
    },
    RampingArrivalRate {
        start_rate: u64,
        time_unit: Duration,
        stages: Vec<Stage>,
        pre_allocated_vus: usize,
        max_vus: usize,
    },
}

/// VUs created up front and the hard ceiling the pool may grow to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBounds {
    pub pre_allocated: usize,
    pub max: usize,
}

impl ExecutorConfig {
    #[must_use]
    pub const fn kind(&self) -> ExecutorKind {
        match self {
            ExecutorConfig::ConstantVus { .. } => ExecutorKind::ConstantVus,
            ExecutorConfig::RampingVus { .. } => ExecutorKind::RampingVus,
            ExecutorConfig::ConstantArrivalRate { .. } => ExecutorKind::ConstantArrivalRate,
            ExecutorConfig::RampingArrivalRate { .. } => ExecutorKind::RampingArrivalRate,
        }
    }

    /// VU targets for closed models, iterations per `time_unit` for open ones.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        match self {
            ExecutorConfig::ConstantVus { vus, duration } => Schedule::constant(*vus, *duration),
            ExecutorConfig::RampingVus { start_vus, stages } => {
                Schedule::new(*start_vus, stages.clone())
            }
            ExecutorConfig::ConstantArrivalRate { rate, duration, .. } => {
                Schedule::constant(*rate, *duration)
            }
            ExecutorConfig::RampingArrivalRate {
                start_rate, stages, ..
            } => Schedule::new(*start_rate, stages.clone()),
        }
    }

    /// Open-model rate denominator; `None` for closed models.
    #[must_use]
    pub const fn time_unit(&self) -> Option<Duration> {
        match self {
            ExecutorConfig::ConstantArrivalRate { time_unit, .. }
            | ExecutorConfig::RampingArrivalRate { time_unit, .. } => Some(*time_unit),
            ExecutorConfig::ConstantVus { .. } | ExecutorConfig::RampingVus { .. } => None,
        }
    }

    /// Closed models allocate their peak up front; open models use their
    /// configured bounds.
    #[must_use]
    pub fn pool_bounds(&self) -> PoolBounds {
        match self {
            ExecutorConfig::ConstantVus { .. } | ExecutorConfig::RampingVus { .. } => {
                let peak = usize::try_from(self.schedule().peak()).unwrap_or(usize::MAX);
                PoolBounds {
                    pre_allocated: peak,
                    max: peak,
                }
            }
            ExecutorConfig::ConstantArrivalRate {
                pre_allocated_vus,
                max_vus,
                ..
            }
            | ExecutorConfig::RampingArrivalRate {
                pre_allocated_vus,
                max_vus,
                ..
            } => PoolBounds {
                pre_allocated: *pre_allocated_vus,
                max: *max_vus,
            },
        }
    }

    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.schedule().total_duration()
    }
}

/// Knobs that shape iterations and shutdown rather than scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Hard bound on one iteration; the request is cancelled when it fires.
    pub iteration_timeout: Duration,
    pub request_timeout: Duration,
    /// How long in-flight iterations may finish after the schedule ends.
    pub graceful_stop: Duration,
    /// Pause after each iteration.
    pub think_time: Option<Duration>,
    /// Request lines buffered ahead of the sample log writer.
    pub sample_log_buffer: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iteration_timeout: DEFAULT_ITERATION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            think_time: None,
            sample_log_buffer: DEFAULT_SAMPLE_LOG_BUFFER,
        }
    }
}

/// Validated, immutable description of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub target: TargetConfig,
    pub executor: ExecutorConfig,
    pub thresholds: Vec<ThresholdRule>,
    /// Trend columns of the report.
    pub summary_trend_stats: Vec<StatKey>,
    pub options: RunOptions,
}

impl ScenarioConfig {
    /// Every percentile the run must compute: the defaults plus whatever
    /// the report columns and thresholds reference.
    #[must_use]
    pub fn percentiles(&self) -> Vec<Percentile> {
        let mut percentiles: Vec<Percentile> = DEFAULT_PERCENTILES.to_vec();
        let referenced = self
            .summary_trend_stats
            .iter()
            .copied()
            .chain(self.thresholds.iter().map(|rule| rule.expr.stat));
        for stat in referenced {
            if let StatKey::Percentile(percentile) = stat {
                percentiles.push(percentile);
            }
        }
        percentiles.sort_unstable();
        percentiles.dedup();
        percentiles
    }

    /// Rules checked during the run, not only at its end.
    pub fn abort_rules(&self) -> impl Iterator<Item = &ThresholdRule> {
        self.thresholds.iter().filter(|rule| rule.abort_on_fail)
    }
}
