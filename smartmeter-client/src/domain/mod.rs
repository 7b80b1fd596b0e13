mod device;
mod usage_reading;

pub use device::{BuildingType, Device, RegisteredDevice, Region, UnknownBuildingType, REGIONS};
pub use usage_reading::{format_timestamp, UsageReading};
