use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::parse::{format_duration, parse_duration, parse_duration_allow_zero};

/// On-disk scenario description. Every field is optional so CLI flags can
/// fill the gaps; validation happens when building a `ScenarioConfig`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<DurationValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<u64>,
    #[serde(alias = "timeUnit", skip_serializing_if = "Option::is_none")]
    pub time_unit: Option<DurationValue>,
    #[serde(alias = "preAllocatedVUs", skip_serializing_if = "Option::is_none")]
    pub pre_allocated_vus: Option<usize>,
    #[serde(alias = "maxVUs", skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<usize>,
    #[serde(alias = "startVUs", skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,
    #[serde(alias = "startRate", skip_serializing_if = "Option::is_none")]
    pub start_rate: Option<u64>,
    #[serde(alias = "summaryTrendStats", skip_serializing_if = "Option::is_none")]
    pub summary_trend_stats: Option<Vec<String>>,
    #[serde(alias = "iterationTimeout", skip_serializing_if = "Option::is_none")]
    pub iteration_timeout: Option<DurationValue>,
    #[serde(alias = "requestTimeout", skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<DurationValue>,
    #[serde(alias = "gracefulStop", skip_serializing_if = "Option::is_none")]
    pub graceful_stop: Option<DurationValue>,
    #[serde(alias = "thinkTime", skip_serializing_if = "Option::is_none")]
    pub think_time: Option<DurationValue>,
    #[serde(alias = "expectedStatus", skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,
    #[serde(
        alias = "discardResponseBodies",
        skip_serializing_if = "Option::is_none"
    )]
    pub discard_response_bodies: Option<bool>,
    #[serde(alias = "sampleLogBuffer", skip_serializing_if = "Option::is_none")]
    pub sample_log_buffer: Option<usize>,
    /// Request log destination: a path, or `-` for stdout.
    #[serde(alias = "sampleLog", skip_serializing_if = "Option::is_none")]
    pub sample_log: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<BTreeMap<String, Vec<ThresholdEntry>>>,
}

/// A duration written as seconds (`30`) or with a unit (`"250ms"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    pub(crate) fn to_duration(&self) -> Result<Duration, ConfigError> {
        match self {
            DurationValue::Seconds(0) => Err(ConfigError::DurationZero),
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration(text),
        }
    }

    pub(crate) fn to_duration_allow_zero(&self) -> Result<Duration, ConfigError> {
        match self {
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration_allow_zero(text),
        }
    }
}

impl From<Duration> for DurationValue {
    fn from(duration: Duration) -> Self {
        DurationValue::Text(format_duration(duration))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub duration: DurationValue,
    pub target: u64,
}

/// A threshold as a bare expression, or with its abort flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ThresholdEntry {
    Expr(String),
    Rule {
        threshold: String,
        #[serde(default, alias = "abortOnFail")]
        abort_on_fail: bool,
    },
}

impl ThresholdEntry {
    #[must_use]
    pub fn expression(&self) -> &str {
        match self {
            ThresholdEntry::Expr(expression)
            | ThresholdEntry::Rule {
                threshold: expression,
                ..
            } => expression,
        }
    }

    #[must_use]
    pub const fn abort_on_fail(&self) -> bool {
        match self {
            ThresholdEntry::Expr(_) => false,
            ThresholdEntry::Rule { abort_on_fail, .. } => *abort_on_fail,
        }
    }
}
