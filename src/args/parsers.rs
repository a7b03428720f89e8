use std::time::Duration;

use super::types::{PositiveU64, PositiveUsize};
use crate::config::{parse_duration, parse_duration_allow_zero};
use crate::domain::Stage;
use crate::error::{AppError, AppResult, ValidationError};
use crate::metrics::StatKey;
use crate::thresholds::ThresholdRule;

pub(super) fn parse_positive_u64(s: &str) -> AppResult<PositiveU64> {
    s.parse::<PositiveU64>().map_err(AppError::from)
}

pub(super) fn parse_positive_usize(s: &str) -> AppResult<PositiveUsize> {
    s.parse::<PositiveUsize>().map_err(AppError::from)
}

pub(crate) fn parse_duration_arg(s: &str) -> AppResult<Duration> {
    parse_duration(s).map_err(AppError::from)
}

pub(crate) fn parse_duration_or_zero_arg(s: &str) -> AppResult<Duration> {
    parse_duration_allow_zero(s).map_err(AppError::from)
}

/// `DURATION:TARGET`, e.g. `30s:100`. Zero-length stages are allowed.
pub(crate) fn parse_stage(s: &str) -> AppResult<Stage> {
    let (duration, target) = s.split_once(':').ok_or_else(|| {
        AppError::validation(ValidationError::InvalidStageFormat {
            value: s.to_owned(),
        })
    })?;
    let target = target
        .trim()
        .parse::<u64>()
        .map_err(|source| ValidationError::InvalidNumber {
            value: target.to_owned(),
            source,
        })?;
    Ok(Stage {
        duration: parse_duration_allow_zero(duration)?,
        target,
    })
}

/// `METRIC:EXPR`, split at the first colon.
pub(crate) fn parse_threshold(s: &str) -> AppResult<ThresholdRule> {
    threshold_rule(s, false)
}

pub(crate) fn parse_abort_threshold(s: &str) -> AppResult<ThresholdRule> {
    threshold_rule(s, true)
}

fn threshold_rule(s: &str, abort_on_fail: bool) -> AppResult<ThresholdRule> {
    match s.split_once(':') {
        Some((metric, expression)) if !metric.trim().is_empty() => {
            Ok(ThresholdRule::new(metric, expression, abort_on_fail)?)
        }
        Some(_) | None => Err(AppError::validation(
            ValidationError::InvalidThresholdFormat {
                value: s.to_owned(),
            },
        )),
    }
}

pub(crate) fn parse_stat_key(s: &str) -> AppResult<StatKey> {
    s.parse::<StatKey>().map_err(AppError::from)
}
