use clap::Parser;
use std::time::Duration;

use crate::domain::{ExecutorKind, Stage};
use crate::metrics::StatKey;
use crate::thresholds::ThresholdRule;

use super::parsers::{
    parse_abort_threshold, parse_duration_arg, parse_duration_or_zero_arg, parse_positive_u64,
    parse_positive_usize, parse_stage, parse_stat_key, parse_threshold,
};
use super::types::{PositiveU64, PositiveUsize};

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Async HTTP load generator with closed-model (VU) and open-model (arrival-rate) executors, percentile summaries, and pass/fail thresholds."
)]
pub struct TesterArgs {
    /// Config file (.toml or .json); defaults to ./surge.toml or ./surge.json when present
    #[arg(long)]
    pub config: Option<String>,

    /// Target URL hit by every iteration
    #[arg(long, short, env = "TEST_URL")]
    pub url: Option<String>,

    /// Scheduling model; inferred from --stage/--rate when omitted
    #[arg(long, short, value_enum)]
    pub executor: Option<ExecutorKind>,

    /// Concurrent VUs for constant-vus
    #[arg(long, value_parser = parse_positive_u64)]
    pub vus: Option<PositiveU64>,

    /// Run duration for constant executors (supports ms/s/m/h)
    #[arg(long, short, value_parser = parse_duration_arg)]
    pub duration: Option<Duration>,

    /// Iterations started per --time-unit for constant-arrival-rate
    #[arg(long, value_parser = parse_positive_u64)]
    pub rate: Option<PositiveU64>,

    /// Period the arrival rate is expressed in (default 1s)
    #[arg(long = "time-unit", value_parser = parse_duration_arg)]
    pub time_unit: Option<Duration>,

    /// VUs created before an arrival-rate run starts
    #[arg(long = "pre-allocated-vus")]
    pub pre_allocated_vus: Option<usize>,

    /// Ceiling an arrival-rate pool may grow to (default: --pre-allocated-vus)
    #[arg(long = "max-vus", value_parser = parse_positive_usize)]
    pub max_vus: Option<PositiveUsize>,

    /// VUs at the start of a ramping-vus schedule (default 1)
    #[arg(long = "start-vus")]
    pub start_vus: Option<u64>,

    /// Arrival rate at the start of a ramping-arrival-rate schedule (default 0)
    #[arg(long = "start-rate")]
    pub start_rate: Option<u64>,

    /// Schedule stage as DURATION:TARGET (repeatable, replaces config stages)
    #[arg(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// Pass/fail rule as METRIC:EXPR, e.g. http_req_duration:p(95)<2000 (repeatable)
    #[arg(long = "threshold", value_parser = parse_threshold)]
    pub thresholds: Vec<ThresholdRule>,

    /// Like --threshold, but a failure during the run stops it early
    #[arg(long = "abort-threshold", value_parser = parse_abort_threshold)]
    pub abort_thresholds: Vec<ThresholdRule>,

    /// Trend columns in the report, e.g. avg,min,med,max,p(90),p(95)
    #[arg(
        long = "summary-trend-stats",
        value_delimiter = ',',
        value_parser = parse_stat_key
    )]
    pub summary_trend_stats: Vec<StatKey>,

    /// Hard bound on one iteration (supports ms/s/m/h)
    #[arg(long = "iteration-timeout", value_parser = parse_duration_arg)]
    pub iteration_timeout: Option<Duration>,

    /// Timeout for each HTTP request (supports ms/s/m/h)
    #[arg(long = "request-timeout", value_parser = parse_duration_arg)]
    pub request_timeout: Option<Duration>,

    /// Time in-flight iterations get to finish after the schedule ends
    #[arg(long = "graceful-stop", value_parser = parse_duration_or_zero_arg)]
    pub graceful_stop: Option<Duration>,

    /// Pause after each iteration
    #[arg(long = "think-time", value_parser = parse_duration_or_zero_arg)]
    pub think_time: Option<Duration>,

    /// Status code that counts as a passed check
    #[arg(long = "expected-status")]
    pub expected_status: Option<u16>,

    /// Drain response bodies without buffering them
    #[arg(long = "discard-response-bodies")]
    pub discard_response_bodies: bool,

    /// Write one CSV line per request to PATH, or to stdout with '-'
    #[arg(long = "sample-log", value_name = "PATH|-")]
    pub sample_log: Option<String>,

    /// Disable the sample log, even when the config file enables it
    #[arg(long = "no-sample-log")]
    pub no_sample_log: bool,

    /// Print the resolved scenario as canonical TOML and exit
    #[arg(long = "print-config")]
    pub print_config: bool,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Disable colored log output
    #[arg(long = "no-color")]
    pub no_color: bool,
}
