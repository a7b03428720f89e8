use super::parse::{format_duration, parse_duration};
use super::types::{ConfigFile, DurationValue, StageConfig, ThresholdEntry};
use super::{apply_args, build_scenario, load_config_file, resolve_sample_log};
use crate::args::TesterArgs;
use crate::domain::{ExecutorConfig, ScenarioConfig, Stage};
use crate::error::{AppError, AppResult, ConfigError, ValidationError};
use crate::metrics::{DEFAULT_TREND_STATS, Percentile, SampleLogTarget, StatKey};
use clap::Parser;
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::tempdir;

fn write_config(name: &str, content: &str) -> AppResult<(tempfile::TempDir, ConfigFile)> {
    let dir = tempdir()?;
    let path = dir.path().join(name);
    std::fs::write(&path, content)?;
    let config = load_config_file(&path)?;
    Ok((dir, config))
}

fn base_file() -> ConfigFile {
    ConfigFile {
        url: Some("http://localhost:8080/".to_owned()),
        ..ConfigFile::default()
    }
}

fn expect_err<T: std::fmt::Debug>(
    result: Result<T, ConfigError>,
    check: fn(&ConfigError) -> bool,
) -> AppResult<()> {
    match result {
        Err(err) if check(&err) => Ok(()),
        other => Err(AppError::run(format!("Unexpected result {:?}", other))),
    }
}

#[test]
fn parse_toml_config_with_k6_aliases() -> AppResult<()> {
    let content = r#"
url = "http://localhost:3000/api"
executor = "ramping-arrival-rate"
startRate = 5
timeUnit = "1m"
preAllocatedVUs = 10
maxVUs = 50
gracefulStop = "0s"

[[stages]]
duration = "30s"
target = 100

[[stages]]
duration = 0
target = 20

[thresholds]
http_req_duration = ["p(95)<2000", "avg<500"]
errors = [{ threshold = "rate<0.01", abortOnFail = true }]
"#;
    let (_dir, config) = write_config("surge.toml", content)?;
    let scenario = build_scenario(&config)?;

    let expected = ExecutorConfig::RampingArrivalRate {
        start_rate: 5,
        time_unit: Duration::from_secs(60),
        stages: vec![
            Stage {
                duration: Duration::from_secs(30),
                target: 100,
            },
            Stage {
                duration: Duration::ZERO,
                target: 20,
            },
        ],
        pre_allocated_vus: 10,
        max_vus: 50,
    };
    if scenario.executor != expected {
        return Err(AppError::run(format!(
            "Unexpected executor {:?}",
            scenario.executor
        )));
    }
    if scenario.options.graceful_stop != Duration::ZERO {
        return Err(AppError::run("Expected zero graceful stop"));
    }
    let described: Vec<(String, String, bool)> = scenario
        .thresholds
        .iter()
        .map(|rule| (rule.metric.clone(), rule.expr.to_string(), rule.abort_on_fail))
        .collect();
    let expected_rules = vec![
        ("errors".to_owned(), "rate<0.01".to_owned(), true),
        ("http_req_duration".to_owned(), "p(95)<2000".to_owned(), false),
        ("http_req_duration".to_owned(), "avg<500".to_owned(), false),
    ];
    if described == expected_rules {
        Ok(())
    } else {
        Err(AppError::run(format!("Unexpected thresholds {:?}", described)))
    }
}

#[test]
fn parse_json_config_with_trend_stats() -> AppResult<()> {
    let content = r#"{
  "url": "https://example.com/",
  "executor": "constant-vus",
  "vus": 3,
  "duration": "1500ms",
  "summaryTrendStats": ["avg", "p(99.9)"],
  "thresholds": { "checks": ["rate>0.99"] },
  "sample_log": "-"
}"#;
    let (_dir, config) = write_config("surge.json", content)?;
    let scenario = build_scenario(&config)?;
    let expected = ExecutorConfig::ConstantVus {
        vus: 3,
        duration: Duration::from_millis(1500),
    };
    if scenario.executor != expected {
        return Err(AppError::run(format!(
            "Unexpected executor {:?}",
            scenario.executor
        )));
    }
    let stats = vec![StatKey::Avg, StatKey::Percentile(Percentile::P99_9)];
    if scenario.summary_trend_stats != stats || scenario.thresholds.len() != 1 {
        return Err(AppError::run(format!("Unexpected scenario {:?}", scenario)));
    }
    let args = TesterArgs::try_parse_from(["surge"])
        .map_err(|err| AppError::run(format!("Parse failed: {}", err)))?;
    match resolve_sample_log(&config, &args)? {
        Some(SampleLogTarget::Stdout) => Ok(()),
        other => Err(AppError::run(format!("Unexpected sample log {:?}", other))),
    }
}

#[test]
fn executor_is_inferred_from_fields() -> AppResult<()> {
    let staged = ConfigFile {
        stages: Some(vec![StageConfig {
            duration: DurationValue::Text("10s".to_owned()),
            target: 4,
        }]),
        ..base_file()
    };
    let paced = ConfigFile {
        rate: Some(20),
        duration: Some(DurationValue::Seconds(5)),
        pre_allocated_vus: Some(2),
        ..base_file()
    };
    let plain = ConfigFile {
        duration: Some(DurationValue::Seconds(5)),
        ..base_file()
    };

    match build_scenario(&staged)?.executor {
        ExecutorConfig::RampingVus { start_vus: 1, .. } => {}
        other => return Err(AppError::run(format!("Expected ramping-vus, got {:?}", other))),
    }
    match build_scenario(&paced)?.executor {
        ExecutorConfig::ConstantArrivalRate {
            rate: 20,
            pre_allocated_vus: 2,
            max_vus: 2,
            time_unit,
            ..
        } if time_unit == Duration::from_secs(1) => {}
        other => {
            return Err(AppError::run(format!(
                "Expected constant-arrival-rate, got {:?}",
                other
            )));
        }
    }
    let scenario = build_scenario(&plain)?;
    match scenario.executor {
        ExecutorConfig::ConstantVus { vus: 1, .. } => {}
        other => return Err(AppError::run(format!("Expected constant-vus, got {:?}", other))),
    }
    if scenario.summary_trend_stats == DEFAULT_TREND_STATS.to_vec() {
        Ok(())
    } else {
        Err(AppError::run("Expected default trend stats"))
    }
}

#[test]
fn invalid_configs_are_rejected() -> AppResult<()> {
    expect_err(build_scenario(&ConfigFile::default()), |err| {
        matches!(err, ConfigError::MissingUrl)
    })?;
    expect_err(
        build_scenario(&ConfigFile {
            url: Some("ftp://localhost/".to_owned()),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::UnsupportedScheme { .. }),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            executor: Some("constant-arrival-rate".to_owned()),
            rate: Some(10),
            duration: Some(DurationValue::Seconds(10)),
            pre_allocated_vus: Some(8),
            max_vus: Some(4),
            ..base_file()
        }),
        |err| {
            matches!(
                err,
                ConfigError::PreAllocatedExceedsMax {
                    pre_allocated: 8,
                    max: 4
                }
            )
        },
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            executor: Some("ramping-arrival-rate".to_owned()),
            vus: Some(3),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::UnexpectedField { field: "vus", .. }),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            executor: Some("constant-arrival-rate".to_owned()),
            duration: Some(DurationValue::Seconds(10)),
            pre_allocated_vus: Some(1),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::MissingField { field: "rate", .. }),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            executor: Some("closed-loop".to_owned()),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::UnknownExecutor { .. }),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            duration: Some(DurationValue::Text("0s".to_owned())),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::InvalidField { field: "duration", .. }),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            stages: Some(vec![
                StageConfig {
                    duration: DurationValue::Seconds(5),
                    target: 2,
                },
                StageConfig {
                    duration: DurationValue::Text("5 weeks".to_owned()),
                    target: 2,
                },
            ]),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::InvalidStage { index: 1, .. }),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            executor: Some("ramping-vus".to_owned()),
            stages: Some(Vec::new()),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::StagesEmpty),
    )?;
    expect_err(
        build_scenario(&ConfigFile {
            duration: Some(DurationValue::Seconds(1)),
            summary_trend_stats: Some(vec!["mode".to_owned()]),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::UnknownSummaryStat { .. }),
    )?;
    let mut thresholds = BTreeMap::new();
    thresholds.insert(
        "errors".to_owned(),
        vec![ThresholdEntry::Expr("rate=0".to_owned())],
    );
    expect_err(
        build_scenario(&ConfigFile {
            duration: Some(DurationValue::Seconds(1)),
            thresholds: Some(thresholds),
            ..base_file()
        }),
        |err| matches!(err, ConfigError::InvalidThreshold { .. }),
    )
}

#[test]
fn unknown_keys_and_extensions_fail_to_load() -> AppResult<()> {
    match write_config("surge.toml", "url = \"http://localhost/\"\nvu = 3\n") {
        Err(AppError::Config(ConfigError::ParseToml { .. })) => {}
        other => return Err(AppError::run(format!("Expected parse error, got {:?}", other))),
    }
    match write_config("surge.yaml", "url: http://localhost/\n") {
        Err(AppError::Config(ConfigError::UnsupportedExtension { ext })) if ext == "yaml" => {
            Ok(())
        }
        other => Err(AppError::run(format!(
            "Expected unsupported extension, got {:?}",
            other
        ))),
    }
}

fn round_trip(scenario: &ScenarioConfig) -> AppResult<()> {
    let text = scenario.to_toml()?;
    let parsed = ScenarioConfig::from_toml(&text)?;
    if parsed == *scenario {
        Ok(())
    } else {
        Err(AppError::run(format!(
            "Round trip changed the scenario:\n{}\n{:?}",
            text, parsed
        )))
    }
}

#[test]
fn scenarios_round_trip_through_toml() -> AppResult<()> {
    let sources = [
        r#"
url = "http://localhost/"
vus = 4
duration = "90s"
think_time = "250ms"
summary_trend_stats = ["med", "p(99.99)"]
"#,
        r#"
url = "http://localhost/"
start_vus = 0
graceful_stop = 0
[[stages]]
duration = "1m"
target = 10
[[stages]]
duration = "0s"
target = 3
"#,
        r#"
url = "https://localhost/health"
rate = 30
time_unit = "100ms"
duration = "2h"
pre_allocated_vus = 0
max_vus = 7
expected_status = 204
discard_response_bodies = true
[thresholds]
http_req_duration = ["p(95)<2000", { threshold = "p(99)<=3500.5", abort_on_fail = true }]
checks = ["rate>0.99"]
"#,
        r#"
url = "http://localhost/"
executor = "ramping-arrival-rate"
pre_allocated_vus = 2
iteration_timeout = "45s"
request_timeout = "1500ms"
sample_log_buffer = 16
[[stages]]
duration = "10s"
target = 50
"#,
    ];
    for source in sources {
        round_trip(&ScenarioConfig::from_toml(source)?)?;
    }
    Ok(())
}

#[test]
fn cli_values_override_file_values() -> AppResult<()> {
    let mut thresholds = BTreeMap::new();
    thresholds.insert(
        "errors".to_owned(),
        vec![ThresholdEntry::Expr("rate<0.1".to_owned())],
    );
    let mut config = ConfigFile {
        vus: Some(2),
        duration: Some(DurationValue::Seconds(30)),
        thresholds: Some(thresholds),
        think_time: Some(DurationValue::Seconds(1)),
        ..base_file()
    };
    let args = TesterArgs::try_parse_from([
        "surge",
        "-u",
        "http://127.0.0.1:9000/",
        "--vus",
        "6",
        "--threshold",
        "errors:rate<0.05",
        "--abort-threshold",
        "http_req_failed:rate<0.5",
        "--think-time",
        "0s",
    ])
    .map_err(|err| AppError::run(format!("Parse failed: {}", err)))?;
    apply_args(&mut config, &args);
    let scenario = build_scenario(&config)?;

    if scenario.target.url != "http://127.0.0.1:9000/" {
        return Err(AppError::run(format!("Unexpected url {}", scenario.target.url)));
    }
    match scenario.executor {
        ExecutorConfig::ConstantVus { vus: 6, duration } if duration == Duration::from_secs(30) => {}
        other => return Err(AppError::run(format!("Unexpected executor {:?}", other))),
    }
    if scenario.options.think_time != Some(Duration::ZERO) {
        return Err(AppError::run("Expected CLI think time to win"));
    }
    let errors_rules = scenario
        .thresholds
        .iter()
        .filter(|rule| rule.metric == "errors")
        .count();
    let aborting = scenario.abort_rules().count();
    if errors_rules == 2 && aborting == 1 {
        Ok(())
    } else {
        Err(AppError::run(format!(
            "Unexpected thresholds {:?}",
            scenario.thresholds
        )))
    }
}

#[test]
fn sample_log_flags_conflict() -> AppResult<()> {
    let config = ConfigFile {
        sample_log: Some("requests.csv".to_owned()),
        ..base_file()
    };
    let both = TesterArgs::try_parse_from(["surge", "--sample-log", "-", "--no-sample-log"])
        .map_err(|err| AppError::run(format!("Parse failed: {}", err)))?;
    match resolve_sample_log(&config, &both) {
        Err(ValidationError::SampleLogConflict) => {}
        other => return Err(AppError::run(format!("Expected conflict, got {:?}", other))),
    }
    let disabled = TesterArgs::try_parse_from(["surge", "--no-sample-log"])
        .map_err(|err| AppError::run(format!("Parse failed: {}", err)))?;
    if resolve_sample_log(&config, &disabled)?.is_some() {
        return Err(AppError::run("Expected the sample log to be disabled"));
    }
    let inherited = TesterArgs::try_parse_from(["surge"])
        .map_err(|err| AppError::run(format!("Parse failed: {}", err)))?;
    match resolve_sample_log(&config, &inherited)? {
        Some(SampleLogTarget::File(path)) if path.ends_with("requests.csv") => Ok(()),
        other => Err(AppError::run(format!("Unexpected target {:?}", other))),
    }
}

#[test]
fn durations_format_in_largest_exact_unit() -> AppResult<()> {
    let cases = [
        (Duration::ZERO, "0s"),
        (Duration::from_millis(250), "250ms"),
        (Duration::from_millis(1500), "1500ms"),
        (Duration::from_secs(45), "45s"),
        (Duration::from_secs(120), "2m"),
        (Duration::from_secs(7200), "2h"),
        (Duration::from_secs(5400), "90m"),
    ];
    for (duration, text) in cases {
        let formatted = format_duration(duration);
        if formatted != text || parse_duration_or_zero(text)? != duration {
            return Err(AppError::run(format!(
                "{:?} formatted as {}, expected {}",
                duration, formatted, text
            )));
        }
    }
    match parse_duration("0ms") {
        Err(ConfigError::DurationZero) => {}
        other => return Err(AppError::run(format!("Expected zero error, got {:?}", other))),
    }
    match parse_duration("5d") {
        Err(ConfigError::InvalidDurationUnit { unit }) if unit == "d" => Ok(()),
        other => Err(AppError::run(format!("Expected unit error, got {:?}", other))),
    }
}

fn parse_duration_or_zero(text: &str) -> Result<Duration, ConfigError> {
    super::parse::parse_duration_allow_zero(text)
}
