use super::{ConfigError, MetricsError, RunError};

impl From<&'static str> for ConfigError {
    fn from(message: &'static str) -> Self {
        ConfigError::TestExpectation { message }
    }
}

impl From<String> for ConfigError {
    fn from(value: String) -> Self {
        ConfigError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for MetricsError {
    fn from(message: &'static str) -> Self {
        MetricsError::TestExpectation { message }
    }
}

impl From<String> for MetricsError {
    fn from(value: String) -> Self {
        MetricsError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for RunError {
    fn from(message: &'static str) -> Self {
        RunError::TestExpectation { message }
    }
}

impl From<String> for RunError {
    fn from(value: String) -> Self {
        RunError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}
