//! Primitive checkers (spec §2 component 1): integer, positive float, cron
//! string, URI, RFC 2616 HTTP date.

use chrono::{DateTime, Utc};
use std::str::FromStr;

use crate::error::ValidationError;

pub fn validate_integer(raw: &str) -> Result<i64, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::NotInteger(raw.to_string()))
}

pub fn validate_positive_float(raw: &str) -> Result<f64, ValidationError> {
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| ValidationError::NotPositiveFloat(raw.to_string()))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NotPositiveFloat(raw.to_string()));
    }
    Ok(value)
}

/// The `cron` crate expects a leading seconds field; spec §4.4's
/// `trigger_on_schedule` uses standard 5-field unix cron (e.g. `"0 0 * * 0"`).
/// A bare 5-field expression gets `"0 "` prepended before parsing.
pub fn validate_cron_line(raw: &str) -> Result<cron::Schedule, ValidationError> {
    let fields = raw.split_whitespace().count();
    let expr = if fields == 5 {
        format!("0 {raw}")
    } else {
        raw.to_string()
    };
    cron::Schedule::from_str(&expr).map_err(|_| ValidationError::NotCronLine(raw.to_string()))
}

pub fn validate_uri(raw: &str) -> Result<url::Url, ValidationError> {
    let url = url::Url::parse(raw).map_err(|_| ValidationError::NotURI(raw.to_string()))?;
    if url.cannot_be_a_base() || url.scheme().is_empty() {
        return Err(ValidationError::NotURI(raw.to_string()));
    }
    Ok(url)
}

/// Parses an RFC 2616 HTTP-date (the format used by `If-Unmodified-Since`
/// and emitted in `Last-Modified`, spec §6.2).
pub fn validate_http_date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    httpdate::parse_http_date(raw)
        .map(DateTime::<Utc>::from)
        .map_err(|_| ValidationError::NotHttpDate(raw.to_string()))
}

/// Formats a timestamp as an RFC 2616 HTTP-date for `Last-Modified`/`Date` headers.
pub fn format_http_date(ts: DateTime<Utc>) -> String {
    httpdate::fmt_http_date(ts.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_accepts_and_rejects() {
        assert_eq!(validate_integer("42").unwrap(), 42);
        assert!(validate_integer("4.2").is_err());
        assert!(validate_integer("abc").is_err());
    }

    #[test]
    fn positive_float_rejects_zero_and_negative() {
        assert!(validate_positive_float("0").is_err());
        assert!(validate_positive_float("-1.0").is_err());
        assert!((validate_positive_float("0.5").unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn cron_line_accepts_standard_five_field_expression() {
        assert!(validate_cron_line("0 0 * * 0").is_ok());
        assert!(validate_cron_line("not a cron").is_err());
    }

    #[test]
    fn uri_requires_scheme() {
        assert!(validate_uri("https://example.com/cat.jpg").is_ok());
        assert!(validate_uri("not-a-uri").is_err());
    }

    #[test]
    fn http_date_round_trips() {
        let raw = "Sun, 06 Nov 1994 08:49:37 GMT";
        let parsed = validate_http_date(raw).unwrap();
        assert_eq!(format_http_date(parsed), raw);
    }
}
