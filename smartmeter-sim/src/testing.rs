//! In-memory repository used by unit tests.

use std::sync::Mutex;

use smartmeter_client::{
    db::{BackendKind, Repository, Result},
    domain::{Device, RegisteredDevice, UsageReading},
};
use time::PrimitiveDateTime;

#[derive(Default)]
pub struct MemoryRepository {
    devices: Mutex<Vec<Device>>,
    readings: Mutex<Vec<UsageReading>>,
    sweeps: Mutex<Vec<PrimitiveDateTime>>,
}

impl MemoryRepository {
    pub fn readings(&self) -> Vec<UsageReading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn sweeps(&self) -> Vec<PrimitiveDateTime> {
        self.sweeps.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Repository for MemoryRepository {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn reset_schema(&self) -> Result<()> {
        self.devices.lock().unwrap().clear();
        self.readings.lock().unwrap().clear();
        Ok(())
    }

    async fn insert_device(&self, device: &Device) -> Result<()> {
        self.devices.lock().unwrap().push(device.clone());
        Ok(())
    }

    async fn insert_reading(&self, reading: &UsageReading) -> Result<()> {
        self.readings.lock().unwrap().push(reading.clone());
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<RegisteredDevice>> {
        Ok(self.devices.lock().unwrap().iter().map(Device::registration).collect())
    }

    async fn delete_readings_older_than(&self, cutoff: PrimitiveDateTime) -> Result<u64> {
        self.sweeps.lock().unwrap().push(cutoff);
        let mut readings = self.readings.lock().unwrap();
        let before = readings.len();
        readings.retain(|r| r.timestamp >= cutoff);
        Ok((before - readings.len()) as u64)
    }

    async fn count_readings(&self) -> Result<u64> {
        Ok(self.readings.lock().unwrap().len() as u64)
    }

    async fn close(&self) {}
}
