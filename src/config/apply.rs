use crate::args::TesterArgs;
use crate::error::ValidationError;
use crate::metrics::SampleLogTarget;
use crate::thresholds::ThresholdRule;

use super::types::{ConfigFile, DurationValue, StageConfig, ThresholdEntry};

/// Overlays CLI values onto the file config. Scalars and lists given on
/// the command line replace file values; thresholds are appended.
pub fn apply_args(config: &mut ConfigFile, args: &TesterArgs) {
    if let Some(url) = args.url.as_ref() {
        config.url = Some(url.clone());
    }
    if let Some(executor) = args.executor {
        config.executor = Some(executor.as_str().to_owned());
    }
    if let Some(vus) = args.vus {
        config.vus = Some(vus.get());
    }
    if let Some(duration) = args.duration {
        config.duration = Some(duration.into());
    }
    if let Some(rate) = args.rate {
        config.rate = Some(rate.get());
    }
    if let Some(time_unit) = args.time_unit {
        config.time_unit = Some(time_unit.into());
    }
    if let Some(pre_allocated) = args.pre_allocated_vus {
        config.pre_allocated_vus = Some(pre_allocated);
    }
    if let Some(max_vus) = args.max_vus {
        config.max_vus = Some(max_vus.get());
    }
    if let Some(start_vus) = args.start_vus {
        config.start_vus = Some(start_vus);
    }
    if let Some(start_rate) = args.start_rate {
        config.start_rate = Some(start_rate);
    }
    if !args.stages.is_empty() {
        config.stages = Some(
            args.stages
                .iter()
                .map(|stage| StageConfig {
                    duration: stage.duration.into(),
                    target: stage.target,
                })
                .collect(),
        );
    }
    if !args.summary_trend_stats.is_empty() {
        config.summary_trend_stats = Some(
            args.summary_trend_stats
                .iter()
                .map(ToString::to_string)
                .collect(),
        );
    }

    let cli_rules = args.thresholds.iter().chain(args.abort_thresholds.iter());
    for rule in cli_rules {
        append_threshold(config, rule);
    }

    apply_durations(config, args);
    if let Some(status) = args.expected_status {
        config.expected_status = Some(status);
    }
    if args.discard_response_bodies {
        config.discard_response_bodies = Some(true);
    }
}

fn apply_durations(config: &mut ConfigFile, args: &TesterArgs) {
    let overrides = [
        (&mut config.iteration_timeout, args.iteration_timeout),
        (&mut config.request_timeout, args.request_timeout),
        (&mut config.graceful_stop, args.graceful_stop),
        (&mut config.think_time, args.think_time),
    ];
    for (slot, value) in overrides {
        if let Some(duration) = value {
            *slot = Some(DurationValue::from(duration));
        }
    }
}

fn append_threshold(config: &mut ConfigFile, rule: &ThresholdRule) {
    let entry = if rule.abort_on_fail {
        ThresholdEntry::Rule {
            threshold: rule.expr.to_string(),
            abort_on_fail: true,
        }
    } else {
        ThresholdEntry::Expr(rule.expr.to_string())
    };
    config
        .thresholds
        .get_or_insert_with(Default::default)
        .entry(rule.metric.clone())
        .or_default()
        .push(entry);
}

/// Sample log destination after the CLI flags had their say.
///
/// # Errors
///
/// Returns an error when `--sample-log` and `--no-sample-log` are combined.
pub fn resolve_sample_log(
    config: &ConfigFile,
    args: &TesterArgs,
) -> Result<Option<SampleLogTarget>, ValidationError> {
    match (args.sample_log.as_deref(), args.no_sample_log) {
        (Some(_), true) => Err(ValidationError::SampleLogConflict),
        (None, true) => Ok(None),
        (Some(target), false) => Ok(Some(SampleLogTarget::parse(target))),
        (None, false) => Ok(config.sample_log.as_deref().map(SampleLogTarget::parse)),
    }
}
