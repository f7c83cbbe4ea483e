use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::matrix::{build_local_matrix, MatrixBuildOptions};
use crate::domain::{
    Delivery, Location, OptimizationResult, RerouteReason, ReroutingInfo, Vehicle,
};
use crate::services::optimization::{OptimizationService, OptimizeOptions};

/// Dynamic re-planning driven by real-time events. Each entrypoint filters
/// completed work, advances vehicle positions along the previous plan,
/// mutates the inputs for the event type, and drives a fresh optimize
/// call. Inputs are copied; the caller's objects are never mutated, and
/// the entrypoints never fail - errors surface as `status=error` results.
pub struct ReroutingService {
    optimization: Arc<OptimizationService>,
}

impl ReroutingService {
    pub fn new(optimization: Arc<OptimizationService>) -> Self {
        Self { optimization }
    }

    /// Re-plan with updated traffic factors (index-keyed, as accepted by
    /// the matrix builder).
    pub async fn reroute_for_traffic(
        &self,
        current: &OptimizationResult,
        locations: &[Location],
        vehicles: &[Vehicle],
        original_deliveries: &[Delivery],
        completed_deliveries: &[String],
        traffic_data: &HashMap<(usize, usize), f64>,
    ) -> OptimizationResult {
        let remaining = remaining_deliveries(original_deliveries, completed_deliveries);
        let vehicles =
            advance_vehicle_positions(vehicles, current, original_deliveries, completed_deliveries);

        let mut result = self
            .optimization
            .optimize(
                locations,
                &vehicles,
                &remaining,
                &OptimizeOptions {
                    consider_traffic: true,
                    traffic_data: Some(traffic_data.clone()),
                    ..OptimizeOptions::default()
                },
            )
            .await;

        result.statistics.rerouting_info = Some(ReroutingInfo {
            traffic_factors: traffic_data.len(),
            completed_deliveries: completed_deliveries.len(),
            remaining_deliveries: remaining.len(),
            ..ReroutingInfo::new(RerouteReason::Traffic)
        });
        result
    }

    /// Re-plan after service delays: delayed locations get their service
    /// time extended and the problem is re-solved with time windows.
    pub async fn reroute_for_delay(
        &self,
        current: &OptimizationResult,
        locations: &[Location],
        vehicles: &[Vehicle],
        original_deliveries: &[Delivery],
        completed_deliveries: &[String],
        delayed_location_ids: &[String],
        delay_minutes: &HashMap<String, u32>,
    ) -> OptimizationResult {
        let known: HashSet<&str> = locations.iter().map(|l| l.id.as_str()).collect();
        for id in delayed_location_ids {
            if !known.contains(id.as_str()) {
                warn!("Unknown delayed location id {id}, skipping");
            }
        }

        let mut locations = locations.to_vec();
        for location in &mut locations {
            if delayed_location_ids.contains(&location.id) {
                let delay = delay_minutes.get(&location.id).copied().unwrap_or(0);
                location.service_time += delay;
            }
        }

        let remaining = remaining_deliveries(original_deliveries, completed_deliveries);
        let vehicles =
            advance_vehicle_positions(vehicles, current, original_deliveries, completed_deliveries);

        let mut result = self
            .optimization
            .optimize(
                &locations,
                &vehicles,
                &remaining,
                &OptimizeOptions {
                    consider_time_windows: true,
                    ..OptimizeOptions::default()
                },
            )
            .await;

        result.statistics.rerouting_info = Some(ReroutingInfo {
            completed_deliveries: completed_deliveries.len(),
            remaining_deliveries: remaining.len(),
            delay_locations: delayed_location_ids.to_vec(),
            ..ReroutingInfo::new(RerouteReason::ServiceDelay)
        });
        result
    }

    /// Re-plan around blocked road segments: both directions of each
    /// blocked pair become prohibitively expensive before re-solving.
    pub async fn reroute_for_roadblock(
        &self,
        current: &OptimizationResult,
        locations: &[Location],
        vehicles: &[Vehicle],
        original_deliveries: &[Delivery],
        completed_deliveries: &[String],
        blocked_segments: &[(String, String)],
    ) -> OptimizationResult {
        let matrix = build_local_matrix(locations, &MatrixBuildOptions::default());
        let mut distances = matrix.distances;

        let mut traffic_data: HashMap<(usize, usize), f64> = HashMap::new();
        for (from_id, to_id) in blocked_segments {
            match (matrix.location_ids.iter().position(|id| id == from_id),
                   matrix.location_ids.iter().position(|id| id == to_id))
            {
                (Some(from_idx), Some(to_idx)) => {
                    distances[from_idx][to_idx] = f64::INFINITY;
                    distances[to_idx][from_idx] = f64::INFINITY;
                }
                _ => warn!(
                    "Location id not found when applying roadblock: {from_id} or {to_id}"
                ),
            }
        }
        for (from_idx, row) in distances.iter().enumerate() {
            for (to_idx, value) in row.iter().enumerate() {
                if value.is_infinite() {
                    traffic_data.insert((from_idx, to_idx), f64::INFINITY);
                }
            }
        }
        info!(
            "Rerouting around {} blocked segments ({} prohibited arcs)",
            blocked_segments.len(),
            traffic_data.len()
        );

        let remaining = remaining_deliveries(original_deliveries, completed_deliveries);
        let vehicles =
            advance_vehicle_positions(vehicles, current, original_deliveries, completed_deliveries);

        let mut result = self
            .optimization
            .optimize(
                locations,
                &vehicles,
                &remaining,
                &OptimizeOptions {
                    consider_traffic: true,
                    traffic_data: Some(traffic_data),
                    ..OptimizeOptions::default()
                },
            )
            .await;

        result.statistics.rerouting_info = Some(ReroutingInfo {
            completed_deliveries: completed_deliveries.len(),
            remaining_deliveries: remaining.len(),
            blocked_segments: blocked_segments.to_vec(),
            ..ReroutingInfo::new(RerouteReason::Roadblock)
        });
        result
    }
}

fn remaining_deliveries(original: &[Delivery], completed: &[String]) -> Vec<Delivery> {
    let completed: HashSet<&str> = completed.iter().map(String::as_str).collect();
    original
        .iter()
        .filter(|d| !completed.contains(d.id.as_str()))
        .cloned()
        .collect()
}

/// Moves each assigned vehicle's start to the stop after the latest stop
/// that served a completed delivery on its previous route.
fn advance_vehicle_positions(
    vehicles: &[Vehicle],
    current: &OptimizationResult,
    original_deliveries: &[Delivery],
    completed: &[String],
) -> Vec<Vehicle> {
    let delivery_location: HashMap<&str, &str> = original_deliveries
        .iter()
        .map(|d| (d.id.as_str(), d.location_id.as_str()))
        .collect();
    let completed_locations: HashSet<&str> = completed
        .iter()
        .filter_map(|id| delivery_location.get(id.as_str()).copied())
        .collect();

    let mut vehicles = vehicles.to_vec();
    for vehicle in &mut vehicles {
        let Some(&route_idx) = current.assigned_vehicles.get(&vehicle.id) else {
            continue;
        };
        let Some(route) = current.detailed_routes.get(route_idx) else {
            continue;
        };

        let last_completed = route
            .stops
            .iter()
            .enumerate()
            .filter(|(_, stop)| completed_locations.contains(stop.as_str()))
            .map(|(idx, _)| idx)
            .max();

        if let Some(idx) = last_completed {
            if idx + 1 < route.stops.len() {
                vehicle.start_location_id = route.stops[idx + 1].clone();
            }
        }
    }
    vehicles
}
