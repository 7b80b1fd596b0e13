use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Classification of the building a meter is installed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    House,
    Apartment,
    Shophouse,
    Office,
    School,
    Hospital,
    Factory,
}

impl BuildingType {
    pub const ALL: [BuildingType; 7] = [
        BuildingType::House,
        BuildingType::Apartment,
        BuildingType::Shophouse,
        BuildingType::Office,
        BuildingType::School,
        BuildingType::Hospital,
        BuildingType::Factory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BuildingType::House => "house",
            BuildingType::Apartment => "apartment",
            BuildingType::Shophouse => "shophouse",
            BuildingType::Office => "office",
            BuildingType::School => "school",
            BuildingType::Hospital => "hospital",
            BuildingType::Factory => "factory",
        }
    }

    /// Offices, schools and factories follow working hours; everything else
    /// has a residential-style morning/evening profile.
    pub fn is_commercial(self) -> bool {
        matches!(
            self,
            BuildingType::Office | BuildingType::School | BuildingType::Factory
        )
    }
}

impl fmt::Display for BuildingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown building type: {0}")]
pub struct UnknownBuildingType(pub String);

impl FromStr for BuildingType {
    type Err = UnknownBuildingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildingType::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| UnknownBuildingType(s.to_string()))
    }
}

/// Named bounding box a device location is drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub name: &'static str,
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Region {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Greater Jakarta sub-areas.
pub const REGIONS: [Region; 5] = [
    Region { name: "Jakarta", min_lat: -6.40, max_lat: -6.15, min_lon: 106.60, max_lon: 106.90 },
    Region { name: "Tangerang", min_lat: -6.50, max_lat: -6.35, min_lon: 106.65, max_lon: 106.90 },
    Region { name: "Bekasi", min_lat: -6.45, max_lat: -6.20, min_lon: 106.90, max_lon: 107.00 },
    Region { name: "Depok", min_lat: -6.60, max_lat: -6.30, min_lon: 106.70, max_lon: 106.85 },
    Region { name: "Bogor", min_lat: -6.65, max_lat: -6.45, min_lon: 106.70, max_lon: 106.90 },
];

/// Full metadata row written once per device at the start of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub device_id: u32,
    pub customer_id: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub building_type: BuildingType,
    pub region: String,
}

impl Device {
    pub fn registration(&self) -> RegisteredDevice {
        RegisteredDevice {
            device_id: self.device_id,
            building_type: self.building_type,
            region: Some(self.region.clone()),
        }
    }
}

/// The part of a device row that usage generation needs, as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDevice {
    pub device_id: u32,
    pub building_type: BuildingType,
    pub region: Option<String>,
}
