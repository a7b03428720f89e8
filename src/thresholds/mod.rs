//! Threshold expressions (`p(95)<2000`, `rate<0.01`) and their evaluation.
mod evaluate;
mod expr;

#[cfg(test)]
mod tests;

pub use evaluate::{ThresholdOutcome, ThresholdResult, evaluate, evaluate_all, evaluate_stream};
pub use expr::{Comparator, ThresholdExpr, ThresholdRule};
