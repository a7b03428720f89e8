use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::domain::{
    DEFAULT_EXPECTED_STATUS, DEFAULT_GRACEFUL_STOP, DEFAULT_ITERATION_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SAMPLE_LOG_BUFFER, DEFAULT_TIME_UNIT, ExecutorConfig,
    ExecutorKind, RunOptions, ScenarioConfig, Stage, TargetConfig,
};
use crate::error::{AppResult, ConfigError};
use crate::metrics::{DEFAULT_TREND_STATS, StatKey};
use crate::thresholds::ThresholdRule;

use super::loader::parse_toml;
use super::types::{ConfigFile, DurationValue, StageConfig, ThresholdEntry};

const DEFAULT_VUS: u64 = 1;
const DEFAULT_START_VUS: u64 = 1;
const DEFAULT_START_RATE: u64 = 0;

/// Validate a merged config file into the immutable run description.
///
/// When `executor` is absent it is inferred: `stages` selects
/// `ramping-vus`, `rate` selects `constant-arrival-rate`, anything else
/// runs `constant-vus`.
///
/// # Errors
///
/// Returns the first validation failure: a missing or malformed URL, an
/// unknown executor, a field the executor requires or rejects, a bad
/// duration, stage, threshold, or summary stat.
pub fn build_scenario(file: &ConfigFile) -> Result<ScenarioConfig, ConfigError> {
    let target = build_target(file)?;
    let kind = match file.executor.as_deref() {
        Some(name) => name.parse()?,
        None => infer_executor(file),
    };
    let executor = build_executor(kind, file)?;
    let thresholds = build_thresholds(file.thresholds.as_ref())?;
    let summary_trend_stats = match file.summary_trend_stats.as_deref() {
        Some(stats) if !stats.is_empty() => stats
            .iter()
            .map(|stat| stat.parse::<StatKey>())
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) | None => DEFAULT_TREND_STATS.to_vec(),
    };
    let options = build_options(file)?;

    Ok(ScenarioConfig {
        target,
        executor,
        thresholds,
        summary_trend_stats,
        options,
    })
}

const fn infer_executor(file: &ConfigFile) -> ExecutorKind {
    if file.stages.is_some() {
        ExecutorKind::RampingVus
    } else if file.rate.is_some() {
        ExecutorKind::ConstantArrivalRate
    } else {
        ExecutorKind::ConstantVus
    }
}

fn build_target(file: &ConfigFile) -> Result<TargetConfig, ConfigError> {
    let url = file.url.as_deref().map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(ConfigError::MissingUrl);
    }
    let parsed = Url::parse(url).map_err(|source| ConfigError::InvalidUrl {
        url: url.to_owned(),
        source,
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme {
            url: url.to_owned(),
        });
    }
    Ok(TargetConfig {
        url: url.to_owned(),
        expected_status: file.expected_status.unwrap_or(DEFAULT_EXPECTED_STATUS),
        discard_response_bodies: file.discard_response_bodies.unwrap_or(false),
    })
}

fn build_executor(kind: ExecutorKind, file: &ConfigFile) -> Result<ExecutorConfig, ConfigError> {
    let executor = kind.as_str();
    let present: [(&'static str, bool); 8] = [
        ("vus", file.vus.is_some()),
        ("duration", file.duration.is_some()),
        ("rate", file.rate.is_some()),
        ("time_unit", file.time_unit.is_some()),
        ("pre_allocated_vus", file.pre_allocated_vus.is_some()),
        ("max_vus", file.max_vus.is_some()),
        ("start_vus", file.start_vus.is_some()),
        ("start_rate", file.start_rate.is_some()),
    ];
    let accepted: &[&str] = match kind {
        ExecutorKind::ConstantVus => &["vus", "duration"],
        ExecutorKind::RampingVus => &["start_vus"],
        ExecutorKind::ConstantArrivalRate => {
            &["rate", "duration", "time_unit", "pre_allocated_vus", "max_vus"]
        }
        ExecutorKind::RampingArrivalRate => {
            &["start_rate", "time_unit", "pre_allocated_vus", "max_vus"]
        }
    };
    if let Some(&(field, _)) = present
        .iter()
        .find(|(field, set)| *set && !accepted.contains(field))
    {
        return Err(ConfigError::UnexpectedField { executor, field });
    }
    if file.stages.is_some() && !kind.uses_stages() {
        return Err(ConfigError::UnexpectedField {
            executor,
            field: "stages",
        });
    }

    match kind {
        ExecutorKind::ConstantVus => Ok(ExecutorConfig::ConstantVus {
            vus: positive_u64(file.vus.unwrap_or(DEFAULT_VUS), "vus")?,
            duration: required_duration(file.duration.as_ref(), executor, "duration")?,
        }),
        ExecutorKind::RampingVus => {
            let config = ExecutorConfig::RampingVus {
                start_vus: file.start_vus.unwrap_or(DEFAULT_START_VUS),
                stages: build_stages(file.stages.as_deref())?,
            };
            if config.schedule().peak() == 0 {
                return Err(ConfigError::FieldMustBePositive {
                    field: "peak VUs (start_vus or a stage target)",
                });
            }
            Ok(config)
        }
        ExecutorKind::ConstantArrivalRate => {
            let (pre_allocated_vus, max_vus) = pool_bounds(file, executor)?;
            Ok(ExecutorConfig::ConstantArrivalRate {
                rate: positive_u64(
                    file.rate.ok_or(ConfigError::MissingField {
                        executor,
                        field: "rate",
                    })?,
                    "rate",
                )?,
                time_unit: time_unit(file)?,
                duration: required_duration(file.duration.as_ref(), executor, "duration")?,
                pre_allocated_vus,
                max_vus,
            })
        }
        ExecutorKind::RampingArrivalRate => {
            let (pre_allocated_vus, max_vus) = pool_bounds(file, executor)?;
            Ok(ExecutorConfig::RampingArrivalRate {
                start_rate: file.start_rate.unwrap_or(DEFAULT_START_RATE),
                time_unit: time_unit(file)?,
                stages: build_stages(file.stages.as_deref())?,
                pre_allocated_vus,
                max_vus,
            })
        }
    }
}

fn pool_bounds(file: &ConfigFile, executor: &'static str) -> Result<(usize, usize), ConfigError> {
    let pre_allocated = file.pre_allocated_vus.ok_or(ConfigError::MissingField {
        executor,
        field: "pre_allocated_vus",
    })?;
    let max = file.max_vus.unwrap_or(pre_allocated);
    if max == 0 {
        return Err(ConfigError::FieldMustBePositive { field: "max_vus" });
    }
    if pre_allocated > max {
        return Err(ConfigError::PreAllocatedExceedsMax { pre_allocated, max });
    }
    Ok((pre_allocated, max))
}

fn time_unit(file: &ConfigFile) -> Result<Duration, ConfigError> {
    file.time_unit.as_ref().map_or(Ok(DEFAULT_TIME_UNIT), |value| {
        value.to_duration().map_err(|err| field_error("time_unit", err))
    })
}

fn build_stages(stages: Option<&[StageConfig]>) -> Result<Vec<Stage>, ConfigError> {
    let stages = stages.unwrap_or_default();
    if stages.is_empty() {
        return Err(ConfigError::StagesEmpty);
    }
    stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let duration = stage.duration.to_duration_allow_zero().map_err(|err| {
                ConfigError::InvalidStage {
                    index,
                    source: Box::new(err),
                }
            })?;
            Ok(Stage {
                duration,
                target: stage.target,
            })
        })
        .collect()
}

/// Rules come out grouped by metric name in sorted order, keeping the
/// per-metric order of the file.
fn build_thresholds(
    thresholds: Option<&BTreeMap<String, Vec<ThresholdEntry>>>,
) -> Result<Vec<ThresholdRule>, ConfigError> {
    let mut rules = Vec::new();
    for (metric, entries) in thresholds.into_iter().flatten() {
        for entry in entries {
            rules.push(ThresholdRule::new(
                metric,
                entry.expression(),
                entry.abort_on_fail(),
            )?);
        }
    }
    Ok(rules)
}

fn build_options(file: &ConfigFile) -> Result<RunOptions, ConfigError> {
    let iteration_timeout = optional_duration(
        file.iteration_timeout.as_ref(),
        "iteration_timeout",
        DurationValue::to_duration,
    )?;
    let request_timeout = optional_duration(
        file.request_timeout.as_ref(),
        "request_timeout",
        DurationValue::to_duration,
    )?;
    let graceful_stop = optional_duration(
        file.graceful_stop.as_ref(),
        "graceful_stop",
        DurationValue::to_duration_allow_zero,
    )?;
    let think_time = optional_duration(
        file.think_time.as_ref(),
        "think_time",
        DurationValue::to_duration_allow_zero,
    )?;
    let sample_log_buffer = file.sample_log_buffer.unwrap_or(DEFAULT_SAMPLE_LOG_BUFFER);
    if sample_log_buffer == 0 {
        return Err(ConfigError::FieldMustBePositive {
            field: "sample_log_buffer",
        });
    }

    Ok(RunOptions {
        iteration_timeout: iteration_timeout.unwrap_or(DEFAULT_ITERATION_TIMEOUT),
        request_timeout: request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        graceful_stop: graceful_stop.unwrap_or(DEFAULT_GRACEFUL_STOP),
        think_time,
        sample_log_buffer,
    })
}

fn optional_duration(
    value: Option<&DurationValue>,
    field: &'static str,
    convert: fn(&DurationValue) -> Result<Duration, ConfigError>,
) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|value| convert(value).map_err(|err| field_error(field, err)))
        .transpose()
}

fn required_duration(
    value: Option<&DurationValue>,
    executor: &'static str,
    field: &'static str,
) -> Result<Duration, ConfigError> {
    let value = value.ok_or(ConfigError::MissingField { executor, field })?;
    value.to_duration().map_err(|err| field_error(field, err))
}

const fn positive_u64(value: u64, field: &'static str) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::FieldMustBePositive { field })
    } else {
        Ok(value)
    }
}

fn field_error(field: &'static str, err: ConfigError) -> ConfigError {
    ConfigError::InvalidField {
        field,
        source: Box::new(err),
    }
}

/// Canonical file form of a scenario: every field spelled out, durations
/// in their largest exact unit. Building the result yields `scenario`
/// back unchanged.
#[must_use]
pub fn to_config_file(scenario: &ScenarioConfig) -> ConfigFile {
    let options = &scenario.options;
    let mut file = ConfigFile {
        url: Some(scenario.target.url.clone()),
        executor: Some(scenario.executor.kind().as_str().to_owned()),
        summary_trend_stats: Some(
            scenario
                .summary_trend_stats
                .iter()
                .map(ToString::to_string)
                .collect(),
        ),
        iteration_timeout: Some(options.iteration_timeout.into()),
        request_timeout: Some(options.request_timeout.into()),
        graceful_stop: Some(options.graceful_stop.into()),
        think_time: options.think_time.map(DurationValue::from),
        expected_status: Some(scenario.target.expected_status),
        discard_response_bodies: Some(scenario.target.discard_response_bodies),
        sample_log_buffer: Some(options.sample_log_buffer),
        thresholds: threshold_entries(&scenario.thresholds),
        ..ConfigFile::default()
    };

    match &scenario.executor {
        ExecutorConfig::ConstantVus { vus, duration } => {
            file.vus = Some(*vus);
            file.duration = Some((*duration).into());
        }
        ExecutorConfig::RampingVus { start_vus, stages } => {
            file.start_vus = Some(*start_vus);
            file.stages = Some(stage_entries(stages));
        }
        ExecutorConfig::ConstantArrivalRate {
            rate,
            time_unit,
            duration,
            pre_allocated_vus,
            max_vus,
        } => {
            file.rate = Some(*rate);
            file.time_unit = Some((*time_unit).into());
            file.duration = Some((*duration).into());
            file.pre_allocated_vus = Some(*pre_allocated_vus);
            file.max_vus = Some(*max_vus);
        }
        ExecutorConfig::RampingArrivalRate {
            start_rate,
            time_unit,
            stages,
            pre_allocated_vus,
            max_vus,
        } => {
            file.start_rate = Some(*start_rate);
            file.time_unit = Some((*time_unit).into());
            file.stages = Some(stage_entries(stages));
            file.pre_allocated_vus = Some(*pre_allocated_vus);
            file.max_vus = Some(*max_vus);
        }
    }
    file
}

fn stage_entries(stages: &[Stage]) -> Vec<StageConfig> {
    stages
        .iter()
        .map(|stage| StageConfig {
            duration: stage.duration.into(),
            target: stage.target,
        })
        .collect()
}

/// A metric with any abort rule writes all of its rules in table form so
/// TOML arrays stay homogeneous.
fn threshold_entries(
    rules: &[ThresholdRule],
) -> Option<BTreeMap<String, Vec<ThresholdEntry>>> {
    if rules.is_empty() {
        return None;
    }
    let mut grouped: BTreeMap<String, Vec<&ThresholdRule>> = BTreeMap::new();
    for rule in rules {
        grouped.entry(rule.metric.clone()).or_default().push(rule);
    }
    let entries = grouped
        .into_iter()
        .map(|(metric, metric_rules)| {
            let tabular = metric_rules.iter().any(|rule| rule.abort_on_fail);
            let metric_entries = metric_rules
                .into_iter()
                .map(|rule| {
                    if tabular {
                        ThresholdEntry::Rule {
                            threshold: rule.expr.to_string(),
                            abort_on_fail: rule.abort_on_fail,
                        }
                    } else {
                        ThresholdEntry::Expr(rule.expr.to_string())
                    }
                })
                .collect();
            (metric, metric_entries)
        })
        .collect();
    Some(entries)
}

impl ScenarioConfig {
    /// Canonical TOML that parses back into this exact scenario.
    ///
    /// # Errors
    ///
    /// Returns an error if TOML serialization fails.
    pub fn to_toml(&self) -> AppResult<String> {
        Ok(toml::to_string(&to_config_file(self))?)
    }

    /// Parse and validate a TOML scenario.
    ///
    /// # Errors
    ///
    /// Returns an error when the text does not parse or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        build_scenario(&parse_toml(content, Path::new("<inline>"))?)
    }
}
