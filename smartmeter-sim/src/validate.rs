use smartmeter_client::domain::UsageReading;
use time::{macros::datetime, PrimitiveDateTime};

const MIN_TS: PrimitiveDateTime = datetime!(2000-01-01 00:00:00);
const MAX_TS: PrimitiveDateTime = datetime!(2100-01-01 00:00:00);

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("power usage must be a finite, non-negative number (got {0})")]
    InvalidUsage(f64),
    #[error("power usage {0} has more than two decimals")]
    TooPrecise(f64),
    #[error("timestamp {0} out of allowed range")]
    TimestampOutOfRange(PrimitiveDateTime),
}

/// Pure validation of a `UsageReading` before it is written.
///
/// Rules:
/// - kWh must be finite, non-negative and rounded to two decimals.
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01).
pub fn validate_reading(reading: &UsageReading) -> Result<(), ValidationError> {
    let kwh = reading.power_usage_kwh;

    if !kwh.is_finite() || kwh < 0.0 {
        return Err(ValidationError::InvalidUsage(kwh));
    }

    if (kwh * 100.0).round() / 100.0 != kwh {
        return Err(ValidationError::TooPrecise(kwh));
    }

    if reading.timestamp < MIN_TS || reading.timestamp >= MAX_TS {
        return Err(ValidationError::TimestampOutOfRange(reading.timestamp));
    }

    Ok(())
}
