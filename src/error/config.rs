use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to parse JSON config '{path}': {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported config extension '{ext}'. Use .toml or .json.")]
    UnsupportedExtension { ext: String },
    #[error("Config file must have .toml or .json extension.")]
    MissingExtension,
    #[error("Missing target URL (set --url, TEST_URL, or 'url' in config).")]
    MissingUrl,
    #[error("Invalid target URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Target URL '{url}' must use http or https.")]
    UnsupportedScheme { url: String },
    #[error("Unknown executor '{value}'. Use constant-vus, ramping-vus, constant-arrival-rate, or ramping-arrival-rate.")]
    UnknownExecutor { value: String },
    #[error("Executor '{executor}' requires '{field}'.")]
    MissingField {
        executor: &'static str,
        field: &'static str,
    },
    #[error("Executor '{executor}' does not accept '{field}'.")]
    UnexpectedField {
        executor: &'static str,
        field: &'static str,
    },
    #[error("Config '{field}' must be >= 1.")]
    FieldMustBePositive { field: &'static str },
    #[error("pre_allocated_vus ({pre_allocated}) cannot exceed max_vus ({max}).")]
    PreAllocatedExceedsMax { pre_allocated: usize, max: usize },
    #[error("Config '{field}': {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("Stage list must not be empty.")]
    StagesEmpty,
    #[error("Stage {index}: {source}")]
    InvalidStage {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("Duration must not be empty.")]
    DurationEmpty,
    #[error("Invalid duration '{value}'.")]
    InvalidDurationFormat { value: String },
    #[error("Invalid duration '{value}': {source}")]
    InvalidDurationNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Duration overflow.")]
    DurationOverflow,
    #[error("Invalid duration unit '{unit}'.")]
    InvalidDurationUnit { unit: String },
    #[error("Duration must be > 0.")]
    DurationZero,
    #[error("Invalid threshold '{expression}' on '{metric}': {reason}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        reason: &'static str,
    },
    #[error("Unknown summary stat '{value}'. Use avg, min, med, max, count, or p(N).")]
    UnknownSummaryStat { value: String },
    #[error("Invalid percentile '{value}'. Expected 0 < N <= 100 with at most 3 decimals.")]
    InvalidPercentile { value: String },
    #[cfg(test)]
    #[error("Test expectation failed: {message}")]
    TestExpectation { message: &'static str },
    #[cfg(test)]
    #[error("Test expectation failed: {message}: {value}")]
    TestExpectationValue {
        message: &'static str,
        value: String,
    },
}
