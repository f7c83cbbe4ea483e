use serde::{Deserialize, Serialize};

use crate::config::constant::DEFAULT_DELIVERY_PRIORITY;

/// A geographic location taking part in a planning request. Time windows
/// are in minutes from midnight; `service_time` is the on-site handling
/// time in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub is_depot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_end: Option<u32>,
    #[serde(default = "default_service_time")]
    pub service_time: u32,
}

fn default_service_time() -> u32 {
    15
}

impl Location {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
            name: None,
            is_depot: false,
            time_window_start: None,
            time_window_end: None,
            service_time: default_service_time(),
        }
    }

    pub fn depot(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            is_depot: true,
            service_time: 0,
            ..Self::new(id, latitude, longitude)
        }
    }

    pub fn with_time_window(mut self, start: u32, end: u32) -> Self {
        self.time_window_start = Some(start);
        self.time_window_end = Some(end);
        self
    }

    pub fn with_service_time(mut self, minutes: u32) -> Self {
        self.service_time = minutes;
        self
    }
}

/// A capacitated vehicle. `end_location_id` defaults to the start location
/// when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub capacity: f64,
    pub start_location_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_location_id: Option<String>,
    #[serde(default = "default_cost_per_km")]
    pub cost_per_km: f64,
    #[serde(default)]
    pub fixed_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stops: Option<usize>,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

fn default_cost_per_km() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

impl Vehicle {
    pub fn new(id: impl Into<String>, capacity: f64, start_location_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capacity,
            start_location_id: start_location_id.into(),
            end_location_id: None,
            cost_per_km: default_cost_per_km(),
            fixed_cost: 0.0,
            max_distance: None,
            max_stops: None,
            available: true,
            skills: Vec::new(),
        }
    }

    /// The location this vehicle must finish at.
    pub fn end_location(&self) -> &str {
        self.end_location_id.as_deref().unwrap_or(&self.start_location_id)
    }
}

/// A pickup or delivery task. Demand is always non-negative; pickups
/// contribute the negative of their demand to the capacity dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub location_id: String,
    pub demand: f64,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub is_pickup: bool,
}

fn default_priority() -> i32 {
    DEFAULT_DELIVERY_PRIORITY
}

impl Delivery {
    pub fn new(
        id: impl Into<String>,
        location_id: impl Into<String>,
        demand: f64,
    ) -> Self {
        Self {
            id: id.into(),
            location_id: location_id.into(),
            demand,
            priority: default_priority(),
            required_skills: Vec::new(),
            is_pickup: false,
        }
    }

    pub fn pickup(id: impl Into<String>, location_id: impl Into<String>, demand: f64) -> Self {
        Self {
            is_pickup: true,
            ..Self::new(id, location_id, demand)
        }
    }

    /// Signed contribution of this task to the capacity dimension.
    pub fn signed_demand(&self) -> f64 {
        if self.is_pickup {
            -self.demand
        } else {
            self.demand
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_deserializes_with_defaults() {
        let loc: Location =
            serde_json::from_str(r#"{"id": "a", "latitude": 1.5, "longitude": 2.5}"#).unwrap();
        assert!(!loc.is_depot);
        assert_eq!(loc.service_time, 15);
        assert_eq!(loc.time_window_start, None);
    }

    #[test]
    fn vehicle_end_location_defaults_to_start() {
        let vehicle = Vehicle::new("v1", 10.0, "depot");
        assert_eq!(vehicle.end_location(), "depot");

        let mut with_end = vehicle.clone();
        with_end.end_location_id = Some("other".to_string());
        assert_eq!(with_end.end_location(), "other");
    }

    #[test]
    fn pickup_demand_is_negative() {
        let pickup = Delivery::pickup("p1", "a", 4.0);
        assert_eq!(pickup.signed_demand(), -4.0);
        let delivery = Delivery::new("d1", "a", 4.0);
        assert_eq!(delivery.signed_demand(), 4.0);
    }
}
