use rand::{seq::SliceRandom, Rng};
use smartmeter_client::{
    db::{Repository, RepositoryError},
    domain::{BuildingType, Device, REGIONS},
};

/// Customer ids are drawn from `CUSTOMER_ID_MIN..CUSTOMER_ID_MAX`.
pub const CUSTOMER_ID_MIN: u32 = 1000;
pub const CUSTOMER_ID_MAX: u32 = 9999;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub region: &'static str,
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

pub fn random_location<R: Rng + ?Sized>(rng: &mut R) -> Location {
    let region = &REGIONS[rng.gen_range(0..REGIONS.len())];
    Location {
        latitude: round5(rng.gen_range(region.min_lat..=region.max_lat)),
        longitude: round5(rng.gen_range(region.min_lon..=region.max_lon)),
        region: region.name,
    }
}

pub fn random_building_type<R: Rng + ?Sized>(rng: &mut R) -> BuildingType {
    BuildingType::ALL[rng.gen_range(0..BuildingType::ALL.len())]
}

/// Size of the customer pool for `num_devices`: about one customer per four
/// devices, never fewer than one.
pub fn customer_pool_size(num_devices: usize) -> usize {
    (num_devices / 4).max(1)
}

/// Build metadata for devices `1..=num_devices`.
///
/// A pool of distinct customer ids is drawn first and every device picks an
/// owner from it with replacement, so customers end up with several devices.
pub fn populate_devices<R: Rng + ?Sized>(rng: &mut R, num_devices: usize) -> Vec<Device> {
    if num_devices == 0 {
        return Vec::new();
    }

    let span = (CUSTOMER_ID_MAX - CUSTOMER_ID_MIN) as usize;
    let pool_size = customer_pool_size(num_devices).min(span);
    let customers: Vec<u32> = rand::seq::index::sample(rng, span, pool_size)
        .into_iter()
        .map(|i| CUSTOMER_ID_MIN + i as u32)
        .collect();

    (1..=num_devices)
        .map(|device_id| {
            let customer_id = *customers.choose(rng).unwrap_or(&CUSTOMER_ID_MIN);
            let location = random_location(rng);
            Device {
                device_id: device_id as u32,
                customer_id,
                latitude: location.latitude,
                longitude: location.longitude,
                building_type: random_building_type(rng),
                region: location.region.to_string(),
            }
        })
        .collect()
}

/// Write each device's metadata row, in id order.
pub async fn register_devices(repo: &dyn Repository, devices: &[Device]) -> Result<(), RepositoryError> {
    for device in devices {
        repo.insert_device(device).await?;
    }
    tracing::info!(devices = devices.len(), "device metadata registered");
    Ok(())
}
