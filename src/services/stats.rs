use tracing::debug;

use crate::domain::{OptimizationResult, RouteSummary, Vehicle, VehicleCost};

/// Computes per-vehicle fixed + variable costs and the overall summary,
/// mutating the result in place. Routes whose vehicle id has no match in
/// the supplied vehicle list still contribute to stop and distance totals
/// but not to costs.
pub struct RouteStatsService;

impl RouteStatsService {
    pub fn add_statistics(result: &mut OptimizationResult, vehicles: &[Vehicle]) {
        let mut total_cost = 0.0;
        let mut total_stops = 0usize;
        let mut total_distance = 0.0;
        let mut total_vehicles = 0usize;

        for route in &result.detailed_routes {
            let route_distance: f64 = route.segments.iter().map(|s| s.distance).sum();
            total_stops += route.stops.len();
            total_distance += route_distance;
            if !route.vehicle_id.is_empty() {
                total_vehicles += 1;
            }

            let Some(vehicle) = vehicles.iter().find(|v| v.id == route.vehicle_id) else {
                debug!(
                    "No vehicle record for route vehicle id {:?}, skipping costs",
                    route.vehicle_id
                );
                continue;
            };

            let variable_cost = route_distance * vehicle.cost_per_km;
            let cost = vehicle.fixed_cost + variable_cost;
            total_cost += cost;

            result.statistics.vehicle_costs.insert(
                vehicle.id.clone(),
                VehicleCost {
                    fixed_cost: vehicle.fixed_cost,
                    variable_cost,
                    cost,
                    total_cost: cost,
                    distance: route_distance,
                },
            );
        }

        result.total_cost = total_cost;
        result.statistics.summary = Some(RouteSummary {
            total_stops,
            total_distance,
            total_vehicles,
            total_cost,
        });
    }
}
