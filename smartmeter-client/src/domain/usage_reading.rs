use serde::Serialize;
use time::{format_description::FormatItem, macros::format_description, PrimitiveDateTime};

/// One timestamped power-usage observation for a device.
///
/// Timestamps are local wall-clock without an offset, matching what is
/// written to the `power_usage.timestamp` text column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReading {
    pub timestamp: PrimitiveDateTime,
    pub device_id: u32,
    pub power_usage_kwh: f64,
}

impl UsageReading {
    pub fn timestamp_iso(&self) -> Result<String, time::error::Format> {
        format_timestamp(self.timestamp)
    }
}

/// Stored form of a timestamp: `YYYY-MM-DDTHH:MM:SS`.
///
/// The width of every component is fixed so lexical order on the stored text
/// equals chronological order, which the retention sweep relies on.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

pub fn format_timestamp(ts: PrimitiveDateTime) -> Result<String, time::error::Format> {
    ts.format(TIMESTAMP_FORMAT)
}
