use crate::metrics::{MetricKind, StatKey, SummaryStats, names};

use super::expr::{ThresholdExpr, ThresholdRule};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdOutcome {
    Pass { observed: f64 },
    Fail { observed: f64 },
    /// The statistic does not exist for the stream's kind; counts as a failure.
    Unsupported,
}

impl ThresholdOutcome {
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, ThresholdOutcome::Pass { .. })
    }

    #[must_use]
    pub const fn observed(&self) -> Option<f64> {
        match self {
            ThresholdOutcome::Pass { observed } | ThresholdOutcome::Fail { observed } => {
                Some(*observed)
            }
            ThresholdOutcome::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub rule: ThresholdRule,
    pub outcome: ThresholdOutcome,
}

/// Check one expression against a stream summary.
#[must_use]
pub fn evaluate(stats: &SummaryStats, expr: &ThresholdExpr) -> ThresholdOutcome {
    match stats.stat(expr.stat) {
        Some(observed) if expr.op.holds(observed, expr.literal) => {
            ThresholdOutcome::Pass { observed }
        }
        Some(observed) => ThresholdOutcome::Fail { observed },
        None => ThresholdOutcome::Unsupported,
    }
}

/// Check a rule against its stream. A stream that never received a sample
/// is evaluated as empty, where every statistic reads zero.
#[must_use]
pub fn evaluate_stream(rule: &ThresholdRule, stats: Option<&SummaryStats>) -> ThresholdOutcome {
    match stats {
        Some(stats) => evaluate(stats, &rule.expr),
        None => {
            let kind = names::builtin_kind(&rule.metric).unwrap_or(match rule.expr.stat {
                StatKey::Rate => MetricKind::Rate,
                StatKey::Value => MetricKind::Gauge,
                StatKey::Avg
                | StatKey::Min
                | StatKey::Med
                | StatKey::Max
                | StatKey::Count
                | StatKey::Percentile(_) => MetricKind::Trend,
            });
            evaluate(&SummaryStats::empty(&rule.metric, kind), &rule.expr)
        }
    }
}

/// Evaluate every rule, looking streams up by name.
pub fn evaluate_all<'rules, I, F>(rules: I, mut lookup: F) -> Vec<ThresholdResult>
where
    I: IntoIterator<Item = &'rules ThresholdRule>,
    F: FnMut(&str) -> Option<SummaryStats>,
{
    rules
        .into_iter()
        .map(|rule| {
            let stats = lookup(&rule.metric);
            ThresholdResult {
                rule: rule.clone(),
                outcome: evaluate_stream(rule, stats.as_ref()),
            }
        })
        .collect()
}
