use std::fmt;

use crate::error::ConfigError;
use crate::metrics::{MetricKind, StatKey, names};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }

    #[must_use]
    pub fn holds(self, observed: f64, literal: f64) -> bool {
        match self {
            Comparator::Lt => observed < literal,
            Comparator::Le => observed <= literal,
            Comparator::Gt => observed > literal,
            Comparator::Ge => observed >= literal,
        }
    }
}

/// `stat comparator literal`, e.g. `p(95)<2000` or `rate<0.01`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub stat: StatKey,
    pub op: Comparator,
    pub literal: f64,
}

impl ThresholdExpr {
    /// # Errors
    ///
    /// Returns an error when the expression has no comparator, names an
    /// unknown statistic, or compares against a non-numeric literal.
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &'static str| ConfigError::InvalidThreshold {
            metric: metric.to_owned(),
            expression: expression.to_owned(),
            reason,
        };
        let compact: String = expression.chars().filter(|ch| !ch.is_whitespace()).collect();
        let op_at = compact
            .find(['<', '>'])
            .ok_or_else(|| invalid("expected one of <, <=, >, >="))?;
        let (stat_text, rest) = compact.split_at(op_at);
        let (op, literal_text) = if let Some(literal) = rest.strip_prefix("<=") {
            (Comparator::Le, literal)
        } else if let Some(literal) = rest.strip_prefix(">=") {
            (Comparator::Ge, literal)
        } else if let Some(literal) = rest.strip_prefix('<') {
            (Comparator::Lt, literal)
        } else if let Some(literal) = rest.strip_prefix('>') {
            (Comparator::Gt, literal)
        } else {
            return Err(invalid("expected one of <, <=, >, >="));
        };
        if stat_text.is_empty() {
            return Err(invalid("missing statistic"));
        }
        let stat: StatKey = stat_text
            .parse()
            .map_err(|_err| invalid("unknown statistic"))?;
        let literal: f64 = literal_text
            .parse()
            .map_err(|_err| invalid("literal is not a number"))?;
        if !literal.is_finite() {
            return Err(invalid("literal is not a number"));
        }
        if let Some(kind) = names::builtin_kind(metric)
            && !stat_applies(stat, kind)
        {
            return Err(invalid("statistic does not apply to this metric"));
        }
        Ok(Self { stat, op, literal })
    }
}

fn stat_applies(stat: StatKey, kind: MetricKind) -> bool {
    match stat {
        StatKey::Rate => matches!(kind, MetricKind::Rate | MetricKind::Counter),
        StatKey::Percentile(_) | StatKey::Med => kind == MetricKind::Trend,
        StatKey::Value => kind == MetricKind::Gauge,
        StatKey::Avg | StatKey::Min | StatKey::Max | StatKey::Count => true,
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.stat, self.op.as_str(), self.literal)
    }
}

/// A pass/fail rule on one metric stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub metric: String,
    pub expr: ThresholdExpr,
    /// Also checked on the live aggregate; a failure ends the run early.
    pub abort_on_fail: bool,
}

impl ThresholdRule {
    /// # Errors
    ///
    /// Returns an error if `expression` is not a valid threshold.
    pub fn new(metric: &str, expression: &str, abort_on_fail: bool) -> Result<Self, ConfigError> {
        let metric = metric.trim();
        if metric.is_empty() {
            return Err(ConfigError::InvalidThreshold {
                metric: metric.to_owned(),
                expression: expression.to_owned(),
                reason: "missing metric name",
            });
        }
        Ok(Self {
            metric: metric.to_owned(),
            expr: ThresholdExpr::parse(metric, expression)?,
            abort_on_fail,
        })
    }
}
