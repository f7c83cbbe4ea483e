use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::types::Delivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Success,
    Failed,
    Error,
}

/// One leg of a vehicle route between two consecutive stops, traced
/// through the road graph. `path` starts at `from_location` and ends at
/// `to_location`; intermediate entries are nodes the shortest path threads
/// through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub from_location: String,
    pub to_location: String,
    pub path: Vec<String>,
    pub distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetailedRoute {
    pub vehicle_id: String,
    pub stops: Vec<String>,
    #[serde(default)]
    pub segments: Vec<RouteSegment>,
    #[serde(default)]
    pub total_distance: f64,
    /// Route duration in minutes when a time dimension was solved, 0 otherwise.
    #[serde(default)]
    pub total_time: f64,
    #[serde(default)]
    pub capacity_utilization: f64,
    /// Arrival time per stop id in scaled seconds from route start.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub estimated_arrival_times: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VehicleCost {
    pub fixed_cost: f64,
    pub variable_cost: f64,
    pub cost: f64,
    pub total_cost: f64,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RouteSummary {
    pub total_stops: usize,
    pub total_distance: f64,
    pub total_vehicles: usize,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerouteReason {
    Traffic,
    ServiceDelay,
    Roadblock,
}

/// Metadata describing why and how a plan was recomputed; embedded in the
/// statistics of a rerouted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReroutingInfo {
    pub reason: RerouteReason,
    #[serde(default)]
    pub traffic_factors: usize,
    #[serde(default)]
    pub completed_deliveries: usize,
    #[serde(default)]
    pub remaining_deliveries: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delay_locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_segments: Vec<(String, String)>,
}

impl ReroutingInfo {
    pub fn new(reason: RerouteReason) -> Self {
        Self {
            reason,
            traffic_factors: 0,
            completed_deliveries: 0,
            remaining_deliveries: 0,
            delay_locations: Vec::new(),
            blocked_segments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Statistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vehicle_costs: BTreeMap<String, VehicleCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RouteSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerouting_info: Option<ReroutingInfo>,
}

/// The canonical optimization outcome. Every delivery id appears either in
/// exactly one route's covered locations or in `unassigned_deliveries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub status: SolveStatus,
    #[serde(default)]
    pub routes: Vec<Vec<String>>,
    #[serde(default)]
    pub total_distance: f64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub assigned_vehicles: BTreeMap<String, usize>,
    #[serde(default)]
    pub unassigned_deliveries: Vec<String>,
    #[serde(default)]
    pub detailed_routes: Vec<DetailedRoute>,
    #[serde(default)]
    pub statistics: Statistics,
}

impl OptimizationResult {
    fn with_status(status: SolveStatus) -> Self {
        Self {
            status,
            routes: Vec::new(),
            total_distance: 0.0,
            total_cost: 0.0,
            assigned_vehicles: BTreeMap::new(),
            unassigned_deliveries: Vec::new(),
            detailed_routes: Vec::new(),
            statistics: Statistics::default(),
        }
    }

    pub fn success() -> Self {
        Self::with_status(SolveStatus::Success)
    }

    /// Solver could not find a solution: empty routes, every delivery
    /// unassigned, diagnostic in statistics.
    pub fn failed(error: impl Into<String>, deliveries: &[Delivery]) -> Self {
        let mut result = Self::with_status(SolveStatus::Failed);
        result.unassigned_deliveries = deliveries.iter().map(|d| d.id.clone()).collect();
        result.statistics.error = Some(error.into());
        result
    }

    /// Pipeline-level error: same shape as `failed` but status `error`.
    pub fn error(message: impl Into<String>, deliveries: &[Delivery]) -> Self {
        let mut result = Self::with_status(SolveStatus::Error);
        result.unassigned_deliveries = deliveries.iter().map(|d| d.id.clone()).collect();
        result.statistics.error = Some(message.into());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SolveStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&RerouteReason::ServiceDelay).unwrap(),
            "\"service_delay\""
        );
    }

    #[test]
    fn result_round_trips_through_json() {
        let mut result = OptimizationResult::success();
        result.routes = vec![vec!["depot".into(), "c1".into(), "depot".into()]];
        result.total_distance = 12.25;
        result.assigned_vehicles.insert("v1".into(), 0);
        result.detailed_routes.push(DetailedRoute {
            vehicle_id: "v1".into(),
            stops: vec!["depot".into(), "c1".into(), "depot".into()],
            segments: vec![RouteSegment {
                from_location: "depot".into(),
                to_location: "c1".into(),
                path: vec!["depot".into(), "c1".into()],
                distance: 6.125,
                estimated_time: Some(7.35),
                error: None,
            }],
            total_distance: 12.25,
            total_time: 30.0,
            capacity_utilization: 0.5,
            estimated_arrival_times: BTreeMap::from([("c1".to_string(), 441)]),
        });
        result.statistics.summary = Some(RouteSummary {
            total_stops: 3,
            total_distance: 12.25,
            total_vehicles: 1,
            total_cost: 12.25,
        });

        let json = serde_json::to_string(&result).unwrap();
        let back: OptimizationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn failed_result_lists_every_delivery() {
        let deliveries = vec![
            Delivery::new("d1", "a", 1.0),
            Delivery::new("d2", "b", 2.0),
        ];
        let result = OptimizationResult::failed("No solution found!", &deliveries);
        assert_eq!(result.status, SolveStatus::Failed);
        assert_eq!(result.unassigned_deliveries, vec!["d1", "d2"]);
        assert_eq!(
            result.statistics.error.as_deref(),
            Some("No solution found!")
        );
    }
}
