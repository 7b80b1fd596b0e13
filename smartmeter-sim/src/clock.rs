use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Source of the local wall-clock time readings are stamped with.
pub trait Clock: Send + Sync {
    fn now(&self) -> PrimitiveDateTime;
}

/// System clock shifted to a fixed UTC offset.
///
/// The offset has to be captured with [`LocalClock::detect`] before any
/// extra threads exist; `time` refuses to read the local offset from a
/// multi-threaded process on some platforms.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    offset: UtcOffset,
}

impl LocalClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn detect() -> Self {
        let offset = match UtcOffset::current_local_offset() {
            Ok(offset) => offset,
            Err(e) => {
                tracing::warn!(error = %e, "could not determine local UTC offset, stamping readings in UTC");
                UtcOffset::UTC
            }
        };
        Self { offset }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }
}

impl Clock for LocalClock {
    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc().to_offset(self.offset);
        // Whole seconds only; stored timestamps carry no fraction.
        let now = now.replace_nanosecond(0).unwrap_or(now);
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub PrimitiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> PrimitiveDateTime {
        self.0
    }
}
