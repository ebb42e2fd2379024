use time::{macros::datetime, OffsetDateTime};

use crate::{aggregation::latest_reading, domain::Reading};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid value")]
    InvalidValue,
    #[error("reading must exceed previous value (previous {previous}, submitted {submitted})")]
    NotIncreasing { previous: f64, submitted: f64 },
    /// The submitted value equals the latest stored one, which is what a
    /// retry of an already-accepted submission looks like.
    #[error("reading {value} equals the latest recorded value and may already have been recorded")]
    AlreadyRecorded { value: f64 },
    #[error("reading date out of allowed range")]
    ReadingDateOutOfRange,
}

/// Parses a user-entered meter value.
pub fn parse_reading_value(raw: &str) -> Result<f64, ValidationError> {
    let value: f64 = raw.trim().parse().map_err(|_| ValidationError::InvalidValue)?;
    validate_value(value)
}

/// Meter values must be finite and non-negative.
pub fn validate_value(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidValue);
    }
    Ok(value)
}

/// Explicit reading dates must fall within [2000-01-01, 2100-01-01].
pub fn validate_reading_date(ts: OffsetDateTime) -> Result<OffsetDateTime, ValidationError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if ts < min_ts || ts > max_ts {
        return Err(ValidationError::ReadingDateOutOfRange);
    }
    Ok(ts)
}

/// Checks a new value against the series it is about to join.
///
/// The comparison is against the reading with the latest `reading_date`,
/// regardless of the order readings were submitted in.
pub fn validate_against_series(series: &[Reading], value: f64) -> Result<(), ValidationError> {
    let Some(previous) = latest_reading(series) else {
        return Ok(());
    };

    if value == previous.value {
        return Err(ValidationError::AlreadyRecorded { value });
    }
    if value < previous.value {
        return Err(ValidationError::NotIncreasing {
            previous: previous.value,
            submitted: value,
        });
    }
    Ok(())
}
