use super::*;
use crate::error::{AppError, AppResult, ConfigError};
use crate::metrics::{MetricKind, Percentile, SampleRecorder, SampleTags, StatKey, names};

fn expect_invalid(metric: &str, expression: &str) -> AppResult<()> {
    match ThresholdExpr::parse(metric, expression) {
        Err(ConfigError::InvalidThreshold { .. }) => Ok(()),
        other => Err(AppError::config(format!(
            "Expected '{}' on '{}' to be rejected, got {:?}",
            expression, metric, other
        ))),
    }
}

#[test]
fn parses_comparators_and_stats() -> AppResult<()> {
    let cases = [
        ("p(95)<2000", StatKey::Percentile(Percentile::P95), Comparator::Lt),
        ("p(99.9) <= 3500", StatKey::Percentile(Percentile::P99_9), Comparator::Le),
        ("avg>10", StatKey::Avg, Comparator::Gt),
        ("max>=0.5", StatKey::Max, Comparator::Ge),
    ];
    for (expression, stat, op) in cases {
        let expr = ThresholdExpr::parse(names::HTTP_REQ_DURATION, expression)?;
        if expr.stat != stat || expr.op != op {
            return Err(AppError::config(format!(
                "Unexpected parse of '{}': {:?}",
                expression, expr
            )));
        }
    }
    let rate = ThresholdExpr::parse(names::ERRORS, "rate<0.01")?;
    if rate.to_string() != "rate<0.01" {
        return Err(AppError::config(format!("Unexpected display: {}", rate)));
    }
    let duration = ThresholdExpr::parse(names::HTTP_REQ_DURATION, "p(95) < 2000.0")?;
    if duration.to_string() != "p(95)<2000" {
        return Err(AppError::config(format!("Unexpected display: {}", duration)));
    }
    Ok(())
}

#[test]
fn rejects_malformed_expressions() -> AppResult<()> {
    expect_invalid(names::HTTP_REQ_DURATION, "p(95)")?;
    expect_invalid(names::HTTP_REQ_DURATION, "p(95)==2000")?;
    expect_invalid(names::HTTP_REQ_DURATION, "<2000")?;
    expect_invalid(names::HTTP_REQ_DURATION, "p95<2000")?;
    expect_invalid(names::HTTP_REQ_DURATION, "p(95)<fast")?;
    expect_invalid(names::HTTP_REQ_DURATION, "p(95)<inf")?;
    expect_invalid(names::HTTP_REQ_DURATION, "rate<0.01")?;
    expect_invalid(names::ERRORS, "p(95)<1")?;
    match ThresholdRule::new("  ", "rate<0.01", false) {
        Err(ConfigError::InvalidThreshold { .. }) => Ok(()),
        other => Err(AppError::config(format!(
            "Expected empty metric to be rejected, got {:?}",
            other
        ))),
    }
}

#[test]
fn evaluates_against_recorded_streams() -> AppResult<()> {
    let recorder = SampleRecorder::new(None);
    let tags = SampleTags::default();
    for value in [100.0, 200.0, 300.0, 400.0] {
        recorder.record(names::HTTP_REQ_DURATION, MetricKind::Trend, value, &tags)?;
    }
    for failed in [0.0, 0.0, 0.0, 1.0] {
        recorder.record(names::ERRORS, MetricKind::Rate, failed, &tags)?;
    }
    let frozen = recorder.freeze()?;
    let percentiles = [Percentile::P95];
    let rules = vec![
        ThresholdRule::new(names::HTTP_REQ_DURATION, "p(95)<2000", false)?,
        ThresholdRule::new(names::HTTP_REQ_DURATION, "max<300", false)?,
        ThresholdRule::new(names::ERRORS, "rate<0.01", true)?,
        ThresholdRule::new(names::DROPPED_ITERATIONS, "count<1", false)?,
    ];
    let results = evaluate_all(&rules, |name| frozen.summary(name, &percentiles));
    let passed: Vec<bool> = results.iter().map(|result| result.outcome.passed()).collect();
    if passed != vec![true, false, false, true] {
        return Err(AppError::config(format!("Unexpected outcomes: {:?}", results)));
    }
    match results.get(2).map(|result| result.outcome) {
        Some(ThresholdOutcome::Fail { observed }) if (observed - 0.25).abs() < 1e-9 => Ok(()),
        other => Err(AppError::config(format!(
            "Expected rate failure at 0.25, got {:?}",
            other
        ))),
    }
}

#[test]
fn unsupported_statistic_fails() -> AppResult<()> {
    let rule = ThresholdRule::new("custom_trend", "rate<1", false)?;
    let recorder = SampleRecorder::new(None);
    recorder.record("custom_trend", MetricKind::Trend, 5.0, &SampleTags::default())?;
    let stats = recorder.snapshot("custom_trend", &[])?;
    let outcome = evaluate_stream(&rule, stats.as_ref());
    if outcome == ThresholdOutcome::Unsupported && !outcome.passed() {
        Ok(())
    } else {
        Err(AppError::config(format!("Expected unsupported, got {:?}", outcome)))
    }
}
