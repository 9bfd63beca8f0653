//! Dispatch configuration.
//!
//! Every field has a default matching the metro demo fleet, so a partial JSON
//! document only needs the values it changes. Keys are camelCase and unknown keys
//! are rejected:
//!
//! ```
//! use parcel_dispatch::config::DispatchConfig;
//!
//! let config: DispatchConfig = serde_json::from_str(r#"{ "capacity": 12, "driverCount": 1 }"#).unwrap();
//! assert_eq!(config.capacity, 12);
//! assert_eq!(config.driver_count, 1);
//! assert_eq!(config.vehicle_count, 3);
//! assert!(config.validate().is_ok());
//!
//! assert!(serde_json::from_str::<DispatchConfig>(r#"{ "vehicle_count": 2 }"#).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{parse_time_of_day, Address, Seconds, VehicleId};
use crate::error::DispatchError;

/// Default depot street address.
pub const DEFAULT_DEPOT: &str = "4001 South 700 E";

/// Routes parcels for a city to a fixed vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalityRule {
    pub city: String,
    pub vehicle: VehicleId,
}

impl LocalityRule {
    pub fn new(city: impl Into<String>, vehicle: VehicleId) -> Self {
        Self {
            city: city.into(),
            vehicle,
        }
    }

    /// Substring match on the destination city.
    pub fn matches(&self, city: &str) -> bool {
        city.contains(self.city.as_str())
    }
}

/// The scripted "corrected address" event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct CorrectionConfig {
    /// Vehicle that receives corrected parcels.
    pub target_vehicle: VehicleId,
    pub address: Address,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            target_vehicle: 3,
            address: Address::new("410 S State St", "Salt Lake City", "UT", "84111"),
        }
    }
}

/// How free-text notes are turned into constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct IngestConfig {
    /// Release time for "delayed" notes that carry no explicit time.
    pub delayed_arrival: String,
    /// Time at which a "wrong address" parcel's destination becomes known.
    pub address_update_time: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delayed_arrival: "09:05:00".to_string(),
            address_update_time: "10:20:00".to_string(),
        }
    }
}

/// Fleet shape and planning policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DispatchConfig {
    pub depot: String,
    pub vehicle_count: usize,
    /// Vehicles `1..=driver_count` leave at `start_time`; the rest wait for a driver.
    pub driver_count: usize,
    pub capacity: usize,
    pub speed: f64,
    pub start_time: String,
    /// Vehicle whose effective capacity shrinks by the number of held parcels.
    pub hold_carrier: VehicleId,
    /// Classification pass 2, rule (a).
    pub grouped_localities: Vec<LocalityRule>,
    /// Re-optimizer bucket (a).
    pub regroup_localities: Vec<LocalityRule>,
    pub max_repair_passes: usize,
    pub correction: CorrectionConfig,
    pub ingest: IngestConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            depot: DEFAULT_DEPOT.to_string(),
            vehicle_count: 3,
            driver_count: 2,
            capacity: 16,
            speed: 18.0,
            start_time: "08:00:00".to_string(),
            hold_carrier: 3,
            grouped_localities: vec![LocalityRule::new("Holladay", 1)],
            regroup_localities: vec![
                LocalityRule::new("Holladay", 1),
                LocalityRule::new("Murray", 3),
                LocalityRule::new("West Valley City", 2),
            ],
            max_repair_passes: 3,
            correction: CorrectionConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl DispatchConfig {
    /// Loads a JSON configuration file and validates it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let raw = std::fs::read_to_string(path)?;
        let config: DispatchConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Departure time of the early vehicles.
    pub fn start_seconds(&self) -> Result<Seconds, DispatchError> {
        parse_time_of_day(&self.start_time)
    }

    /// Number of vehicles leaving at the start time.
    pub fn early_count(&self) -> usize {
        self.driver_count.clamp(1, self.vehicle_count.max(1))
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.vehicle_count == 0 {
            return Err(DispatchError::InvalidConfig("vehicleCount must be at least 1".into()));
        }
        if self.driver_count == 0 {
            return Err(DispatchError::InvalidConfig("driverCount must be at least 1".into()));
        }
        if self.speed.is_nan() || self.speed <= 0.0 {
            return Err(DispatchError::InvalidConfig("speed must be positive".into()));
        }
        let in_fleet = |id: VehicleId| (1..=self.vehicle_count).contains(&id);
        if !in_fleet(self.hold_carrier) {
            return Err(DispatchError::InvalidConfig(format!(
                "holdCarrier {} is not a fleet vehicle",
                self.hold_carrier
            )));
        }
        if !in_fleet(self.correction.target_vehicle) {
            return Err(DispatchError::InvalidConfig(format!(
                "correction target {} is not a fleet vehicle",
                self.correction.target_vehicle
            )));
        }
        if let Some(rule) = self
            .grouped_localities
            .iter()
            .chain(&self.regroup_localities)
            .find(|rule| !in_fleet(rule.vehicle))
        {
            return Err(DispatchError::InvalidConfig(format!(
                "locality '{}' targets unknown vehicle {}",
                rule.city, rule.vehicle
            )));
        }
        self.start_seconds()?;
        parse_time_of_day(&self.ingest.delayed_arrival)?;
        parse_time_of_day(&self.ingest.address_update_time)?;
        Ok(())
    }
}
