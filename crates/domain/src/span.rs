//! Access span parsing.
//!
//! Spans use the compact `1h30m` / `1.5h` / `90s` notation that requesters
//! and policy authors write in manifests.

use chrono::TimeDelta;
use jitgate_core::{AppError, AppResult};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

// Longer fractions add nothing at nanosecond precision.
const MAX_FRACTION_DIGITS: usize = 18;

/// Parses an access span such as `10m`, `1h30m` or `2.5h`.
pub fn parse_access_span(value: &str) -> AppResult<TimeDelta> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(
            "access span must not be empty".to_owned(),
        ));
    }

    if trimmed == "0" {
        return Ok(TimeDelta::zero());
    }

    if trimmed.starts_with('-') {
        return Err(AppError::Validation(format!(
            "access span '{value}' must not be negative"
        )));
    }

    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest.is_empty() {
        return Err(invalid_span(value));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, after_whole) = split_digits(rest);
        let (fraction, after_fraction) = match after_whole.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after_whole),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid_span(value));
        }

        let unit_length = after_fraction
            .find(|character: char| character.is_ascii_digit() || character == '.')
            .unwrap_or(after_fraction.len());
        let unit = &after_fraction[..unit_length];
        if unit.is_empty() {
            return Err(AppError::Validation(format!(
                "missing unit in access span '{value}'"
            )));
        }
        let unit_nanos = unit_nanos(unit).ok_or_else(|| {
            AppError::Validation(format!("unknown unit '{unit}' in access span '{value}'"))
        })?;

        let whole_value = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| span_overflow(value))?
        };
        let component = whole_value
            .checked_mul(unit_nanos)
            .and_then(|nanos| nanos.checked_add(fraction_nanos(fraction, unit_nanos)))
            .ok_or_else(|| span_overflow(value))?;
        total = total
            .checked_add(component)
            .ok_or_else(|| span_overflow(value))?;

        rest = &after_fraction[unit_length..];
    }

    let nanos = i64::try_from(total).map_err(|_| span_overflow(value))?;
    Ok(TimeDelta::nanoseconds(nanos))
}

fn split_digits(value: &str) -> (&str, &str) {
    let end = value
        .find(|character: char| !character.is_ascii_digit())
        .unwrap_or(value.len());
    value.split_at(end)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SECOND),
        "m" => Some(NANOS_PER_MINUTE),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}

fn fraction_nanos(fraction: &str, unit_nanos: u128) -> u128 {
    let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if digits.is_empty() {
        return 0;
    }

    let numerator = digits.parse::<u128>().unwrap_or(0);
    let scale = 10_u128.pow(u32::try_from(digits.len()).unwrap_or(0));
    numerator.saturating_mul(unit_nanos) / scale
}

fn invalid_span(value: &str) -> AppError {
    AppError::Validation(format!("invalid access span '{value}'"))
}

fn span_overflow(value: &str) -> AppError {
    AppError::Validation(format!("access span '{value}' is out of range"))
}
