use std::collections::HashMap;

use crate::config::constant::{
    CAPACITY_SCALING_FACTOR, DISTANCE_SCALING_FACTOR, GLOBAL_SPAN_COST_COEFFICIENT,
    MAX_ROUTE_DISTANCE_KM, MAX_ROUTE_DURATION_MIN, MAX_SAFE_DISTANCE, MAX_SAFE_TIME,
    TIME_SCALING_FACTOR, TIME_WINDOW_SLACK_MIN,
};
use crate::domain::{Delivery, Location, Vehicle};

/// Interior (non-depot) node sequence per vehicle. Start and end nodes are
/// implicit and come from the problem encoding.
pub(crate) type Solution = Vec<Vec<usize>>;

/// Integer-scaled encoding of one solve call. All floating-point inputs are
/// scaled up front so the search works on exact integer arithmetic.
#[derive(Debug)]
pub(crate) struct Problem {
    /// Scaled arc costs derived from the distance matrix.
    pub cost: Vec<Vec<i64>>,
    /// Scaled arc transit seconds (travel + destination service time).
    /// Present when balancing on time; `None` means balance on distance.
    pub transit: Option<Vec<Vec<i64>>>,
    /// Per-node cumulative time bounds in scaled seconds.
    pub windows: Vec<Option<(i64, i64)>>,
    /// Net scaled demand per node (pickups negative).
    pub demand: Vec<i64>,
    pub capacities: Vec<i64>,
    pub starts: Vec<usize>,
    pub ends: Vec<usize>,
    pub max_route_cost: Vec<i64>,
    pub max_stops: Vec<Option<usize>>,
    /// Nodes that carry at least one task and must be visited.
    pub required: Vec<usize>,
    /// Maximum waiting before a window opens, scaled seconds.
    pub slack_max: i64,
    /// Maximum route duration, scaled seconds.
    pub horizon: i64,
    pub span_coefficient: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct RouteEval {
    /// Scaled distance cost of the route.
    pub cost: i64,
    /// Route duration in scaled seconds (0 without a time dimension).
    pub duration: i64,
    /// Value of the balancing dimension for this route.
    pub span: i64,
    /// Cumulative arrival per stop (departure first), scaled seconds.
    pub arrivals: Vec<i64>,
    /// Highest cumulative load reached along the route, scaled.
    pub peak_load: i64,
}

pub(crate) fn scale_distance(km: f64) -> i64 {
    let safe = if km.is_finite() {
        km.clamp(0.0, MAX_SAFE_DISTANCE)
    } else {
        MAX_SAFE_DISTANCE
    };
    (safe * DISTANCE_SCALING_FACTOR) as i64
}

fn scale_minutes(minutes: f64) -> i64 {
    let safe = if minutes.is_finite() {
        minutes.clamp(0.0, MAX_SAFE_TIME)
    } else {
        MAX_SAFE_TIME
    };
    (safe * TIME_SCALING_FACTOR) as i64
}

fn scaled_cost_matrix(distances: &[Vec<f64>]) -> Vec<Vec<i64>> {
    distances
        .iter()
        .map(|row| row.iter().map(|&km| scale_distance(km)).collect())
        .collect()
}

fn resolve_endpoints(
    vehicles: &[Vehicle],
    index_of: &HashMap<&str, usize>,
) -> Result<(Vec<usize>, Vec<usize>), String> {
    let mut starts = Vec::with_capacity(vehicles.len());
    let mut ends = Vec::with_capacity(vehicles.len());
    for vehicle in vehicles {
        let Some(&start) = index_of.get(vehicle.start_location_id.as_str()) else {
            return Err(format!(
                "Vehicle location not found: {}",
                vehicle.start_location_id
            ));
        };
        let end = index_of
            .get(vehicle.end_location())
            .copied()
            .unwrap_or(start);
        starts.push(start);
        ends.push(end);
    }
    Ok((starts, ends))
}

fn node_demands(
    n: usize,
    deliveries: &[Delivery],
    index_of: &HashMap<&str, usize>,
) -> (Vec<i64>, Vec<usize>) {
    let mut demand = vec![0i64; n];
    let mut required = Vec::new();
    for delivery in deliveries {
        if let Some(&idx) = index_of.get(delivery.location_id.as_str()) {
            demand[idx] += (delivery.signed_demand() * CAPACITY_SCALING_FACTOR) as i64;
            if !required.contains(&idx) {
                required.push(idx);
            }
        }
    }
    (demand, required)
}

fn vehicle_bounds(vehicles: &[Vehicle]) -> (Vec<i64>, Vec<i64>, Vec<Option<usize>>) {
    let capacities = vehicles
        .iter()
        .map(|v| (v.capacity * CAPACITY_SCALING_FACTOR) as i64)
        .collect();
    let max_route_cost = vehicles
        .iter()
        .map(|v| scale_distance(v.max_distance.unwrap_or(MAX_ROUTE_DISTANCE_KM)))
        .collect();
    let max_stops = vehicles.iter().map(|v| v.max_stops).collect();
    (capacities, max_route_cost, max_stops)
}

impl Problem {
    /// Encoding for the plain (distance-cost) variant. An optional time
    /// matrix in minutes switches load balancing to the time dimension.
    pub fn build(
        distances: &[Vec<f64>],
        location_ids: &[String],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        time_matrix: Option<&[Vec<f64>]>,
    ) -> Result<Self, String> {
        let index_of: HashMap<&str, usize> = location_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        let (starts, ends) = resolve_endpoints(vehicles, &index_of)?;
        let (demand, required) = node_demands(location_ids.len(), deliveries, &index_of);
        let (capacities, max_route_cost, max_stops) = vehicle_bounds(vehicles);

        let transit = time_matrix.map(|tm| {
            tm.iter()
                .map(|row| row.iter().map(|&minutes| scale_minutes(minutes)).collect())
                .collect()
        });

        Ok(Self {
            cost: scaled_cost_matrix(distances),
            transit,
            windows: vec![None; location_ids.len()],
            demand,
            capacities,
            starts,
            ends,
            max_route_cost,
            max_stops,
            required,
            slack_max: 0,
            horizon: (MAX_ROUTE_DURATION_MIN * TIME_SCALING_FACTOR) as i64,
            span_coefficient: GLOBAL_SPAN_COST_COEFFICIENT,
        })
    }

    /// Encoding for the time-window variant: a time dimension accumulates
    /// travel time at `speed_km_per_hour` plus destination service time,
    /// and per-node windows constrain the cumulative variable.
    pub fn build_with_time_windows(
        distances: &[Vec<f64>],
        location_ids: &[String],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        locations: &[Location],
        speed_km_per_hour: f64,
    ) -> Result<Self, String> {
        let mut problem = Self::build(distances, location_ids, vehicles, deliveries, None)?;

        let location_of: HashMap<&str, &Location> =
            locations.iter().map(|loc| (loc.id.as_str(), loc)).collect();
        let n = location_ids.len();

        let mut transit = vec![vec![0i64; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let safe_km = distances[i][j].min(MAX_SAFE_DISTANCE);
                let travel_minutes = safe_km / speed_km_per_hour * 60.0;
                let service_minutes = location_of
                    .get(location_ids[j].as_str())
                    .map_or(0.0, |loc| loc.service_time as f64);
                transit[i][j] = scale_minutes(travel_minutes + service_minutes);
            }
        }

        let mut windows = vec![None; n];
        for (idx, id) in location_ids.iter().enumerate() {
            if let Some(loc) = location_of.get(id.as_str()) {
                if let (Some(start), Some(end)) = (loc.time_window_start, loc.time_window_end) {
                    windows[idx] = Some((
                        start as i64 * TIME_SCALING_FACTOR as i64,
                        end as i64 * TIME_SCALING_FACTOR as i64,
                    ));
                }
            }
        }

        problem.transit = Some(transit);
        problem.windows = windows;
        problem.slack_max = (TIME_WINDOW_SLACK_MIN * TIME_SCALING_FACTOR) as i64;
        Ok(problem)
    }

    pub fn num_vehicles(&self) -> usize {
        self.starts.len()
    }

    /// Checks a single vehicle route for feasibility and evaluates it.
    /// Returns `None` when any dimension bound is violated.
    pub fn evaluate_route(&self, vehicle: usize, interior: &[usize]) -> Option<RouteEval> {
        let start = self.starts[vehicle];
        let end = self.ends[vehicle];

        if let Some(max) = self.max_stops[vehicle] {
            if interior.len() > max {
                return None;
            }
        }

        // Capacity dimension: cumulative load stays within [0, capacity].
        let mut load = 0i64;
        let mut peak_load = 0i64;
        for &node in std::iter::once(&start).chain(interior) {
            load += self.demand[node];
            if load < 0 || load > self.capacities[vehicle] {
                return None;
            }
            peak_load = peak_load.max(load);
        }

        let mut cost = 0i64;
        let mut prev = start;
        for &node in interior.iter().chain(std::iter::once(&end)) {
            cost += self.cost[prev][node];
            prev = node;
        }
        if cost > self.max_route_cost[vehicle] {
            return None;
        }

        let (duration, arrivals) = match &self.transit {
            None => (0, Vec::new()),
            Some(transit) => {
                let mut departure = self.windows[start].map_or(0, |(open, _)| open);
                // Delay departure instead of idling before the first stop.
                if let Some(&first) = interior.first() {
                    if let Some((open, _)) = self.windows[first] {
                        let raw = departure + transit[start][first];
                        if raw < open {
                            departure += open - raw;
                        }
                    }
                }
                if let Some((_, close)) = self.windows[start] {
                    if departure > close {
                        return None;
                    }
                }

                let mut now = departure;
                let mut arrivals = vec![departure];
                let mut prev = start;
                for &node in interior.iter().chain(std::iter::once(&end)) {
                    let mut arrival = now + transit[prev][node];
                    if let Some((open, close)) = self.windows[node] {
                        if arrival < open {
                            if open - arrival > self.slack_max {
                                return None;
                            }
                            arrival = open;
                        }
                        if arrival > close {
                            return None;
                        }
                    }
                    if arrival - departure > self.horizon {
                        return None;
                    }
                    arrivals.push(arrival);
                    now = arrival;
                    prev = node;
                }
                (now - departure, arrivals)
            }
        };

        let span = if self.transit.is_some() { duration } else { cost };

        Some(RouteEval {
            cost,
            duration,
            span,
            arrivals,
            peak_load,
        })
    }

    /// Total objective: scaled arc costs plus the global-span term that
    /// pushes the solver to balance work across vehicles. `None` when any
    /// route is infeasible.
    pub fn objective(&self, solution: &Solution) -> Option<i64> {
        let mut total_cost = 0i64;
        let mut max_span = 0i64;
        for (vehicle, interior) in solution.iter().enumerate() {
            let eval = self.evaluate_route(vehicle, interior)?;
            total_cost += eval.cost;
            max_span = max_span.max(eval.span);
        }
        Some(total_cost + self.span_coefficient * max_span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_problem(capacity: f64) -> Problem {
        // depot, a, b laid out on a line one km apart.
        let distances = vec![
            vec![0.0, 1.0, 2.0],
            vec![1.0, 0.0, 1.0],
            vec![2.0, 1.0, 0.0],
        ];
        let ids = vec!["depot".to_string(), "a".to_string(), "b".to_string()];
        let vehicles = vec![Vehicle::new("v1", capacity, "depot")];
        let deliveries = vec![
            Delivery::new("d1", "a", 3.0),
            Delivery::new("d2", "b", 4.0),
        ];
        Problem::build(&distances, &ids, &vehicles, &deliveries, None).unwrap()
    }

    #[test]
    fn scaling_truncates_to_integer_units() {
        assert_eq!(scale_distance(1.237), 123);
        assert_eq!(scale_distance(-5.0), 0);
        assert_eq!(scale_distance(f64::NAN), 100_000_000);
    }

    #[test]
    fn route_cost_accumulates_scaled_arcs() {
        let problem = simple_problem(10.0);
        let eval = problem.evaluate_route(0, &[1, 2]).unwrap();
        // depot -> a -> b -> depot = 1 + 1 + 2 km.
        assert_eq!(eval.cost, 400);
        assert_eq!(eval.peak_load, 700);
    }

    #[test]
    fn capacity_violation_is_infeasible() {
        let problem = simple_problem(5.0);
        assert!(problem.evaluate_route(0, &[1, 2]).is_none());
        assert!(problem.evaluate_route(0, &[1]).is_some());
    }

    #[test]
    fn pickup_before_delivery_can_go_negative() {
        let distances = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let ids = vec!["depot".to_string(), "a".to_string()];
        let vehicles = vec![Vehicle::new("v1", 10.0, "depot")];
        let deliveries = vec![Delivery::pickup("p1", "a", 3.0)];
        let problem = Problem::build(&distances, &ids, &vehicles, &deliveries, None).unwrap();
        // Cumulative load would dip below zero at the pickup node.
        assert!(problem.evaluate_route(0, &[1]).is_none());
    }

    #[test]
    fn missing_vehicle_location_fails_fast() {
        let distances = vec![vec![0.0]];
        let ids = vec!["depot".to_string()];
        let vehicles = vec![Vehicle::new("v1", 10.0, "elsewhere")];
        let err = Problem::build(&distances, &ids, &vehicles, &[], None).unwrap_err();
        assert!(err.contains("elsewhere"));
    }

    #[test]
    fn time_windows_bound_cumulative_arrivals() {
        let distances = vec![vec![0.0, 60.0], vec![60.0, 0.0]];
        let ids = vec!["depot".to_string(), "a".to_string()];
        let vehicles = vec![Vehicle::new("v1", 10.0, "depot")];
        let deliveries = vec![Delivery::new("d1", "a", 1.0)];
        let locations = vec![
            Location::depot("depot", 0.0, 0.0).with_time_window(0, 1440),
            Location::new("a", 0.0, 0.0)
                .with_time_window(60, 90)
                .with_service_time(10),
        ];
        // 60 km at 60 km/h = 60 min travel + 10 min service = arrival 70.
        let problem = Problem::build_with_time_windows(
            &distances, &ids, &vehicles, &deliveries, &locations, 60.0,
        )
        .unwrap();
        let eval = problem.evaluate_route(0, &[1]).unwrap();
        assert_eq!(eval.arrivals[1], 70 * 60);

        // Shrinking the window below the arrival time makes it infeasible.
        let tight = vec![
            locations[0].clone(),
            Location::new("a", 0.0, 0.0)
                .with_time_window(0, 60)
                .with_service_time(10),
        ];
        let problem =
            Problem::build_with_time_windows(&distances, &ids, &vehicles, &deliveries, &tight, 60.0)
                .unwrap();
        assert!(problem.evaluate_route(0, &[1]).is_none());
    }

    #[test]
    fn departure_shifts_to_meet_late_first_window() {
        let distances = vec![vec![0.0, 10.0], vec![10.0, 0.0]];
        let ids = vec!["depot".to_string(), "a".to_string()];
        let vehicles = vec![Vehicle::new("v1", 10.0, "depot")];
        let deliveries = vec![Delivery::new("d1", "a", 1.0)];
        let locations = vec![
            Location::depot("depot", 0.0, 0.0),
            Location::new("a", 0.0, 0.0)
                .with_time_window(600, 700)
                .with_service_time(0),
        ];
        // Travel is only 10 minutes but the window opens at minute 600:
        // far beyond the 60-minute slack, so the departure itself shifts.
        let problem = Problem::build_with_time_windows(
            &distances, &ids, &vehicles, &deliveries, &locations, 60.0,
        )
        .unwrap();
        let eval = problem.evaluate_route(0, &[1]).unwrap();
        assert_eq!(eval.arrivals[0], (600 - 10) * 60);
        assert_eq!(eval.arrivals[1], 600 * 60);
    }

    #[test]
    fn objective_adds_span_term() {
        let problem = simple_problem(10.0);
        let solution: Solution = vec![vec![1, 2]];
        let objective = problem.objective(&solution).unwrap();
        // 400 cost + 100 coefficient * 400 span (distance dimension).
        assert_eq!(objective, 400 + 100 * 400);
    }
}
