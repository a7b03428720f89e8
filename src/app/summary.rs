use std::collections::BTreeSet;

use crate::domain::ScenarioConfig;
use crate::metrics::{MetricKind, SIGNIFICANT_DIGITS, StatKey, SummaryStats};
use crate::thresholds::ThresholdResult;

use super::runner::RunOutcome;

/// Width of the dotted metric-name column.
const NAME_WIDTH: usize = 32;
const PASS_MARK: &str = "✓";
const FAIL_MARK: &str = "✗";
/// Trend values at or above this many milliseconds print in seconds.
const MS_PER_SEC: f64 = 1000.0;

/// Render the end-of-run report, one entry per line.
#[must_use]
pub fn report_lines(outcome: &RunOutcome, scenario: &ScenarioConfig) -> Vec<String> {
    let mut lines = Vec::new();
    let mut reported: BTreeSet<&str> = BTreeSet::new();

    for stats in &outcome.summaries {
        reported.insert(stats.name.as_str());
        let results: Vec<&ThresholdResult> = thresholds_for(outcome, &stats.name);
        lines.push(format!(
            "  {} {:.<width$}: {}",
            metric_mark(&results),
            stats.name,
            stream_values(stats, &scenario.summary_trend_stats),
            width = NAME_WIDTH
        ));
        lines.extend(results.iter().map(|result| threshold_line(result)));
    }

    // Thresholds on streams that never received a sample.
    let unreported: BTreeSet<&str> = outcome
        .thresholds
        .iter()
        .map(|result| result.rule.metric.as_str())
        .filter(|metric| !reported.contains(metric))
        .collect();
    for metric in unreported {
        let results = thresholds_for(outcome, metric);
        lines.push(format!(
            "  {} {:.<width$}: no samples",
            metric_mark(&results),
            metric,
            width = NAME_WIDTH
        ));
        lines.extend(results.iter().map(|result| threshold_line(result)));
    }

    lines.push(String::new());
    lines.push(format!(
        "percentiles: HDR histogram, {} significant digits (relative error <= {}%), clamped to observed min/max",
        SIGNIFICANT_DIGITS,
        relative_error_percent()
    ));
    lines.push(format!(
        "duration: {:.2}s (executor {}, {} started, {} dropped)",
        outcome.elapsed.as_secs_f64(),
        scenario.executor.kind(),
        outcome.executor.started,
        outcome.executor.dropped
    ));
    if !outcome.drain.drained {
        lines.push(format!(
            "graceful stop: {} VUs cancelled",
            outcome.drain.aborted
        ));
    }
    if let Some(lines_written) = outcome.sample_lines {
        lines.push(format!("sample log: {} lines", lines_written));
    }
    lines.push(format!("status: {}", run_status(outcome)));
    lines.push(format!("result: {}", run_result(outcome)));
    lines
}

/// Print the report to stdout.
pub fn print_report(outcome: &RunOutcome, scenario: &ScenarioConfig) {
    for line in report_lines(outcome, scenario) {
        println!("{}", line);
    }
}

fn thresholds_for<'outcome>(
    outcome: &'outcome RunOutcome,
    metric: &str,
) -> Vec<&'outcome ThresholdResult> {
    outcome
        .thresholds
        .iter()
        .filter(|result| result.rule.metric == metric)
        .collect()
}

fn metric_mark(results: &[&ThresholdResult]) -> &'static str {
    if results.is_empty() {
        " "
    } else if results.iter().all(|result| result.outcome.passed()) {
        PASS_MARK
    } else {
        FAIL_MARK
    }
}

fn threshold_line(result: &ThresholdResult) -> String {
    let mark = if result.outcome.passed() {
        PASS_MARK
    } else {
        FAIL_MARK
    };
    let observed = result.outcome.observed().map_or_else(
        || "unsupported for this metric".to_owned(),
        |value| format!("observed {}", format_number(value)),
    );
    let abort = if result.rule.abort_on_fail {
        " [abort on fail]"
    } else {
        ""
    };
    format!("      {} {} ({}){}", mark, result.rule.expr, observed, abort)
}

fn stream_values(stats: &SummaryStats, trend_stats: &[StatKey]) -> String {
    match stats.kind {
        MetricKind::Trend => trend_stats
            .iter()
            .map(|key| {
                let value = stats.stat(*key).unwrap_or(0.0);
                match key {
                    StatKey::Count => format!("{}={}", key, stats.count),
                    StatKey::Avg
                    | StatKey::Min
                    | StatKey::Med
                    | StatKey::Max
                    | StatKey::Rate
                    | StatKey::Value
                    | StatKey::Percentile(_) => format!("{}={}", key, format_ms(value)),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        MetricKind::Rate => format!(
            "{:.2}% {} {} {} {}",
            stats.rate * 100.0,
            PASS_MARK,
            stats.passes,
            FAIL_MARK,
            stats.fails()
        ),
        MetricKind::Counter => format!(
            "{} {}/s",
            format_number(stats.sum),
            format_number(stats.rate)
        ),
        MetricKind::Gauge => format!(
            "{} min={} max={}",
            format_number(stats.last),
            format_number(stats.min),
            format_number(stats.max)
        ),
    }
}

fn format_ms(value: f64) -> String {
    if value >= MS_PER_SEC {
        format!("{:.2}s", value / MS_PER_SEC)
    } else {
        format!("{:.2}ms", value)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn relative_error_percent() -> String {
    let bound = 100.0 / 10_f64.powi(i32::from(SIGNIFICANT_DIGITS));
    format!("{}", bound)
}

fn run_status(outcome: &RunOutcome) -> String {
    if let Some(detail) = outcome.failure.as_ref() {
        return format!("stopped by iteration error: {}", detail);
    }
    if let Some(abort) = outcome.abort.as_ref() {
        return format!(
            "aborted by threshold '{}: {}'",
            abort.rule.metric, abort.rule.expr
        );
    }
    if outcome.executor.interrupted {
        "interrupted".to_owned()
    } else {
        "completed".to_owned()
    }
}

fn run_result(outcome: &RunOutcome) -> String {
    let failed = outcome.failed_thresholds();
    let total = outcome.thresholds.len();
    match outcome.verdict() {
        Ok(()) if total == 0 => "PASSED (no thresholds)".to_owned(),
        Ok(()) => format!("PASSED ({} of {} thresholds passed)", total, total),
        Err(_reason) => format!("FAILED ({} of {} thresholds failed)", failed, total),
    }
}
