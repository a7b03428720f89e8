use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Value must be >= 1.")]
    MustBePositive,
    #[error("Invalid number '{value}': {source}")]
    InvalidNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Invalid stage '{value}'. Expected 'DURATION:TARGET' (e.g. 30s:100).")]
    InvalidStageFormat { value: String },
    #[error("Invalid threshold '{value}'. Expected 'METRIC:EXPR' (e.g. http_req_duration:p(95)<2000).")]
    InvalidThresholdFormat { value: String },
    #[error("--sample-log and --no-sample-log cannot be combined.")]
    SampleLogConflict,
}
