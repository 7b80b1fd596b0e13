//! Synthetic power usage keyed by building type, day of week and hour.
//!
//! Commercial buildings (office, school, factory) draw most power during
//! working hours on weekdays and a moderate amount around midday at the
//! weekend. Residential and mixed buildings have a steadier baseline with
//! morning and evening bumps. Every value is the base usage scaled by a
//! time factor, a ±20% jitter and, rarely, a transient spike.

use std::ops::RangeInclusive;

use rand::Rng;
use smartmeter_client::domain::{BuildingType, RegisteredDevice, UsageReading};
use time::{PrimitiveDateTime, Weekday};

pub const DEFAULT_BASE_USAGE: f64 = 1.0;
pub const JITTER: RangeInclusive<f64> = 0.8..=1.2;
pub const SPIKE_PROBABILITY: f64 = 0.01;
pub const SPIKE: RangeInclusive<f64> = 1.5..=2.5;

pub fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Saturday | Weekday::Sunday)
}

/// Range the time-of-day multiplier is drawn from. Hour windows are
/// half-open, so 17:00 on a weekday is already off-hours for an office.
pub fn factor_range(building: BuildingType, weekend: bool, hour: u8) -> RangeInclusive<f64> {
    let within = |start: u8, end: u8| (start..end).contains(&hour);

    match (building.is_commercial(), weekend) {
        (true, false) if within(7, 17) => 2.0..=3.0,
        (true, false) => 0.5..=1.2,
        (true, true) if within(8, 16) => 1.0..=2.0,
        (true, true) => 0.3..=1.0,
        (false, false) if within(5, 9) || within(18, 22) => 1.5..=2.5,
        (false, true) if within(6, 10) || within(18, 22) => 1.5..=2.5,
        (false, _) => 1.0..=2.0,
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy)]
pub struct UsageModel {
    base_usage: f64,
    spike_probability: f64,
}

impl Default for UsageModel {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_USAGE)
    }
}

impl UsageModel {
    pub fn new(base_usage: f64) -> Self {
        Self {
            base_usage,
            spike_probability: SPIKE_PROBABILITY,
        }
    }

    /// Model without transient spikes, for checking the regular envelope.
    pub fn without_spikes(mut self) -> Self {
        self.spike_probability = 0.0;
        self
    }

    pub fn base_usage(&self) -> f64 {
        self.base_usage
    }

    pub fn time_factor<R: Rng + ?Sized>(&self, rng: &mut R, building: BuildingType, at: PrimitiveDateTime) -> f64 {
        let range = factor_range(building, is_weekend(at.weekday()), at.hour());
        rng.gen_range(range)
    }

    /// kWh for one reading, rounded to two decimals.
    pub fn sample_kwh<R: Rng + ?Sized>(&self, rng: &mut R, building: BuildingType, at: PrimitiveDateTime) -> f64 {
        let factor = self.time_factor(rng, building, at);
        let mut usage = self.base_usage * factor * rng.gen_range(JITTER);

        if rng.gen_bool(self.spike_probability) {
            usage *= rng.gen_range(SPIKE);
        }

        round2(usage)
    }

    pub fn usage_at<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        device: &RegisteredDevice,
        at: PrimitiveDateTime,
    ) -> UsageReading {
        UsageReading {
            timestamp: at,
            device_id: device.device_id,
            power_usage_kwh: self.sample_kwh(rng, device.building_type, at),
        }
    }
}
