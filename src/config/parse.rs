use std::time::Duration;

use crate::error::ConfigError;

const MILLIS_PER_SEC: u128 = 1_000;
const MILLIS_PER_MIN: u128 = 60_000;
const MILLIS_PER_HOUR: u128 = 3_600_000;

/// Parses `250ms`, `30s`, `5m`, `1h`, or a bare number of seconds.
/// Zero is rejected.
pub(crate) fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration_allow_zero(value)?;
    if duration.as_millis() == 0 {
        return Err(ConfigError::DurationZero);
    }
    Ok(duration)
}

/// Same grammar as [`parse_duration`], but `0s` is a valid answer.
pub(crate) fn parse_duration_allow_zero(value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::DurationEmpty);
    }

    let digits_len = value.chars().take_while(char::is_ascii_digit).count();
    if digits_len == 0 {
        return Err(ConfigError::InvalidDurationFormat {
            value: value.to_owned(),
        });
    }
    let (num_part, unit_part) = value.split_at(digits_len);
    let number: u64 = num_part
        .parse()
        .map_err(|source| ConfigError::InvalidDurationNumber {
            value: value.to_owned(),
            source,
        })?;

    let unit = if unit_part.is_empty() { "s" } else { unit_part };
    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "s" => Ok(Duration::from_secs(number)),
        "m" => number
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or(ConfigError::DurationOverflow),
        "h" => number
            .checked_mul(60)
            .and_then(|minutes| minutes.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or(ConfigError::DurationOverflow),
        _ => Err(ConfigError::InvalidDurationUnit {
            unit: unit.to_owned(),
        }),
    }
}

/// Shortest exact rendering in the largest whole unit; sub-millisecond
/// precision is dropped.
#[must_use]
pub(crate) fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_owned();
    }
    if millis % MILLIS_PER_HOUR == 0 {
        format!("{}h", millis / MILLIS_PER_HOUR)
    } else if millis % MILLIS_PER_MIN == 0 {
        format!("{}m", millis / MILLIS_PER_MIN)
    } else if millis % MILLIS_PER_SEC == 0 {
        format!("{}s", millis / MILLIS_PER_SEC)
    } else {
        format!("{}ms", millis)
    }
}
