//! Flush interval parsing.
//!
//! Interval strings use the Go duration grammar that access-log configs are
//! usually written in: an optional sign followed by one or more
//! `<decimal><unit>` groups, e.g. `"100ms"`, `"1.5s"`, `"1h30m"`. Valid units
//! are `ns`, `us` (or `µs` / `μs`), `ms`, `s`, `m` and `h`. A bare `"0"` is
//! accepted.

use std::fmt;
use std::time::Duration;

use crate::error::IntervalError;

/// Largest representable duration in nanoseconds (`i64::MAX`), matching the
/// range of the grammar's reference implementation.
const MAX_NANOS: u128 = i64::MAX as u128;

/// A flush interval as configured.
///
/// Built once from the config string and never changed afterwards. Anything
/// that is not a strictly positive duration ends up as [`FlushInterval::Invalid`],
/// which makes the scheduler fall back to polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushInterval {
    Every(Duration),
    Invalid(IntervalError),
}

impl FlushInterval {
    pub fn parse(input: &str) -> Self {
        match parse_duration(input) {
            Ok(d) if d.is_zero() => FlushInterval::Invalid(IntervalError::NonPositive(input.to_string())),
            Ok(d) => FlushInterval::Every(d),
            Err(e) => FlushInterval::Invalid(e),
        }
    }

    /// The ticker period, if the interval was valid.
    pub fn period(&self) -> Option<Duration> {
        match self {
            FlushInterval::Every(d) => Some(*d),
            FlushInterval::Invalid(_) => None,
        }
    }
}

impl fmt::Display for FlushInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushInterval::Every(d) => write!(f, "every {:?}", d),
            FlushInterval::Invalid(e) => write!(f, "invalid ({})", e),
        }
    }
}

/// Parse a Go-style duration string.
///
/// Negative durations are reported as [`IntervalError::NonPositive`] since a
/// [`Duration`] cannot hold them.
pub fn parse_duration(input: &str) -> Result<Duration, IntervalError> {
    let invalid = || IntervalError::Invalid(input.to_string());

    let mut s = input;
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }

    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !s.is_empty() {
        // integer part
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, rest) = s.split_at(int_len);
        s = rest;

        // fractional part
        let mut frac_digits = "";
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            let (digits, rest) = rest.split_at(frac_len);
            frac_digits = digits;
            s = rest;
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid());
        }

        let unit_len = s
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        if unit_len == 0 {
            return Err(IntervalError::MissingUnit(input.to_string()));
        }
        let (unit, rest) = s.split_at(unit_len);
        s = rest;

        let scale = unit_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let overflow = || IntervalError::Overflow(input.to_string());
        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        // Digits past nanosecond precision cannot change the result.
        let mut frac_scale = scale;
        for digit in frac_digits.bytes() {
            if frac_scale < 10 {
                break;
            }
            frac_scale /= 10;
            nanos += u128::from(digit - b'0') * frac_scale;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        if total > MAX_NANOS {
            return Err(overflow());
        }
    }

    if negative && total != 0 {
        return Err(IntervalError::NonPositive(input.to_string()));
    }

    // total <= i64::MAX, so the split into seconds and nanoseconds is lossless
    let secs = (total / 1_000_000_000) as u64;
    let sub = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, sub))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}
