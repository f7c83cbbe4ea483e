mod construction;
mod model;
mod search;

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::constant::DISTANCE_SCALING_FACTOR;
use crate::domain::{Delivery, DetailedRoute, Location, OptimizationResult, Vehicle};
use model::{Problem, Solution};

const DEFAULT_SEARCH_SEED: u64 = 67;

/// Vehicle Routing Problem solver. Encodes a request into integer-scaled
/// dimensions (distance cost, capacity, optionally time), builds a
/// path-cheapest-arc first solution and improves it with local search
/// until the configured time limit.
pub struct VrpSolver {
    time_limit: Duration,
    seed: u64,
}

impl VrpSolver {
    pub fn new(time_limit: Duration) -> Self {
        Self {
            time_limit,
            seed: DEFAULT_SEARCH_SEED,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Solves the capacity-constrained problem. The optional `time_matrix`
    /// (minutes) switches load balancing from the distance dimension to a
    /// time dimension. `_depot_index` is a fallback kept for callers whose
    /// vehicles carry no explicit endpoints; every vehicle here does.
    pub fn solve(
        &self,
        distance_matrix: &[Vec<f64>],
        location_ids: &[String],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        _depot_index: usize,
        time_matrix: Option<&[Vec<f64>]>,
    ) -> OptimizationResult {
        if deliveries.is_empty() {
            return empty_problem_result(vehicles);
        }

        let problem = match Problem::build(
            distance_matrix,
            location_ids,
            vehicles,
            deliveries,
            time_matrix,
        ) {
            Ok(problem) => problem,
            Err(message) => {
                warn!("Solver encoding failed: {message}");
                return OptimizationResult::failed(message, deliveries);
            }
        };

        self.run(&problem, location_ids, vehicles, deliveries, false)
    }

    /// Solves with per-location time windows. Travel time between nodes is
    /// derived from the distance matrix at `speed_km_per_hour` plus the
    /// destination's service time; arrival times are reported per stop.
    pub fn solve_with_time_windows(
        &self,
        distance_matrix: &[Vec<f64>],
        location_ids: &[String],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        locations: &[Location],
        _depot_index: usize,
        speed_km_per_hour: f64,
    ) -> OptimizationResult {
        if deliveries.is_empty() {
            return empty_problem_result(vehicles);
        }

        let problem = match Problem::build_with_time_windows(
            distance_matrix,
            location_ids,
            vehicles,
            deliveries,
            locations,
            speed_km_per_hour,
        ) {
            Ok(problem) => problem,
            Err(message) => {
                warn!("Solver encoding failed: {message}");
                return OptimizationResult::failed(message, deliveries);
            }
        };

        self.run(&problem, location_ids, vehicles, deliveries, true)
    }

    fn run(
        &self,
        problem: &Problem,
        location_ids: &[String],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        with_arrivals: bool,
    ) -> OptimizationResult {
        let started = Instant::now();
        let (initial, unserved) = construction::path_cheapest_arc(problem);
        if !unserved.is_empty() {
            warn!(
                "No feasible assignment for {} of {} task nodes",
                unserved.len(),
                problem.required.len()
            );
            return OptimizationResult::failed("No solution found!", deliveries);
        }

        let deadline = started + self.time_limit;
        let best = search::improve(problem, initial, deadline, self.seed);
        info!(
            "Solver finished in {:.2}s",
            started.elapsed().as_secs_f64()
        );

        assemble(problem, &best, location_ids, vehicles, deliveries, with_arrivals)
    }
}

/// With no deliveries there is nothing to optimize: one trivial
/// start-to-end route per vehicle.
fn empty_problem_result(vehicles: &[Vehicle]) -> OptimizationResult {
    let mut result = OptimizationResult::success();
    for (idx, vehicle) in vehicles.iter().enumerate() {
        result.routes.push(vec![
            vehicle.start_location_id.clone(),
            vehicle.end_location().to_string(),
        ]);
        result.assigned_vehicles.insert(vehicle.id.clone(), idx);
    }
    result.statistics.info =
        Some("Empty problem: direct depot-to-depot routes created".to_string());
    result
}

fn assemble(
    problem: &Problem,
    solution: &Solution,
    location_ids: &[String],
    vehicles: &[Vehicle],
    deliveries: &[Delivery],
    with_arrivals: bool,
) -> OptimizationResult {
    let mut result = OptimizationResult::success();

    for (vehicle_idx, interior) in solution.iter().enumerate() {
        let Some(eval) = problem.evaluate_route(vehicle_idx, interior) else {
            // The search only ever returns feasible solutions.
            warn!("Skipping infeasible route for vehicle {}", vehicle_idx);
            continue;
        };

        let stop_indices: Vec<usize> = std::iter::once(problem.starts[vehicle_idx])
            .chain(interior.iter().copied())
            .chain(std::iter::once(problem.ends[vehicle_idx]))
            .collect();
        let stops: Vec<String> = stop_indices
            .iter()
            .map(|&idx| location_ids[idx].clone())
            .collect();

        let meaningful = stops.len() > 2 || (stops.len() == 2 && stops[0] != stops[1]);
        if !meaningful {
            continue;
        }

        let route_km = eval.cost as f64 / DISTANCE_SCALING_FACTOR;
        result.total_distance += route_km;

        let mut estimated_arrival_times = BTreeMap::new();
        if with_arrivals {
            for (pos, &node) in stop_indices.iter().enumerate() {
                estimated_arrival_times.insert(location_ids[node].clone(), eval.arrivals[pos]);
            }
        }

        let capacity = problem.capacities[vehicle_idx];
        result.detailed_routes.push(DetailedRoute {
            vehicle_id: vehicles[vehicle_idx].id.clone(),
            stops: stops.clone(),
            segments: Vec::new(),
            total_distance: route_km,
            total_time: if problem.transit.is_some() {
                eval.duration as f64 / 60.0
            } else {
                0.0
            },
            capacity_utilization: if capacity > 0 {
                eval.peak_load as f64 / capacity as f64
            } else {
                0.0
            },
            estimated_arrival_times,
        });

        result
            .assigned_vehicles
            .insert(vehicles[vehicle_idx].id.clone(), result.routes.len());
        result.routes.push(stops);
    }

    let visited: HashSet<&str> = result
        .routes
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    result.unassigned_deliveries = deliveries
        .iter()
        .filter(|d| !visited.contains(d.location_id.as_str()))
        .map(|d| d.id.clone())
        .collect();

    result
}
