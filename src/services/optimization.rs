use std::collections::HashMap;

use serde_json::json;
use tracing::{error, info};

use crate::cache::{MatrixCache, ResultCache};
use crate::config::constant::DEFAULT_SPEED_KMH;
use crate::config::Settings;
use crate::core::matrix::{apply_traffic_factors, sanitize, MatrixBuildOptions, MatrixBuilder};
use crate::domain::{Delivery, Location, OptimizationResult, SolveStatus, Vehicle};
use crate::error::OptimizerError;
use crate::services::annotation::{PathAnnotator, RoadNetwork};
use crate::services::depot;
use crate::services::stats::RouteStatsService;
use crate::solver::VrpSolver;

/// Per-request options for [`OptimizationService::optimize`].
#[derive(Debug, Clone, Default)]
pub struct OptimizeOptions {
    pub consider_traffic: bool,
    pub consider_time_windows: bool,
    /// Index-keyed traffic factors, already translated from the ingress shape.
    pub traffic_data: Option<HashMap<(usize, usize), f64>>,
    pub use_api: Option<bool>,
    pub api_key: Option<String>,
}

/// Orchestrates the planning pipeline: validate, build and sanitize the
/// matrices, apply traffic, solve, annotate, compute statistics, and cache
/// the whole result under a deterministic fingerprint.
pub struct OptimizationService {
    settings: Settings,
    solver: VrpSolver,
    matrix_builder: MatrixBuilder,
    result_cache: ResultCache,
}

impl OptimizationService {
    pub fn new(settings: Settings, matrix_cache: Option<MatrixCache>) -> Self {
        let solver = VrpSolver::new(settings.solver_time_limit);
        let matrix_builder = MatrixBuilder::new(settings.clone(), matrix_cache);
        let result_cache = ResultCache::new(settings.result_cache_timeout);
        Self {
            settings,
            solver,
            matrix_builder,
            result_cache,
        }
    }

    /// Contract entrypoint: never fails. Invalid input and unexpected
    /// pipeline errors both surface as a `status=error` result with every
    /// delivery unassigned.
    pub async fn optimize(
        &self,
        locations: &[Location],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        options: &OptimizeOptions,
    ) -> OptimizationResult {
        match self
            .optimize_checked(locations, vehicles, deliveries, options)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Error optimizing routes: {e}");
                OptimizationResult::error(format!("Optimization failed: {e}"), deliveries)
            }
        }
    }

    /// Variant that lets the HTTP boundary distinguish invalid input from
    /// unexpected failures.
    pub async fn optimize_checked(
        &self,
        locations: &[Location],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        options: &OptimizeOptions,
    ) -> Result<OptimizationResult, OptimizerError> {
        info!(
            "Validating inputs: {} locations, {} vehicles, {} deliveries",
            locations.len(),
            vehicles.len(),
            deliveries.len()
        );
        validate_inputs(locations, vehicles, deliveries)?;

        let use_api = options.use_api.unwrap_or(self.settings.use_api_by_default);
        let fingerprint = self.fingerprint(locations, vehicles, deliveries, options, use_api);
        if let Some(hit) = self.result_cache.get(&fingerprint) {
            info!("Returning cached result for fingerprint {fingerprint}");
            return Ok(hit);
        }

        let build_options = MatrixBuildOptions {
            use_api,
            api_key: options.api_key.clone(),
            ..MatrixBuildOptions::default()
        };
        let mut matrix = self.matrix_builder.build(locations, &build_options).await;
        sanitize(&mut matrix.distances);

        if options.consider_traffic {
            if let Some(factors) = &options.traffic_data {
                info!("Applying {} traffic factors", factors.len());
                apply_traffic_factors(&mut matrix.distances, factors);
                sanitize(&mut matrix.distances);
            }
        }

        let depot_index = depot::first_depot(locations)
            .and_then(|d| matrix.index_of(&d.id))
            .unwrap_or(0);

        let mut result = if options.consider_time_windows {
            info!("Solving VRP with time windows");
            self.solver.solve_with_time_windows(
                &matrix.distances,
                &matrix.location_ids,
                vehicles,
                deliveries,
                locations,
                depot_index,
                DEFAULT_SPEED_KMH,
            )
        } else {
            info!("Solving VRP without time windows");
            self.solver.solve(
                &matrix.distances,
                &matrix.location_ids,
                vehicles,
                deliveries,
                depot_index,
                matrix.times.as_deref(),
            )
        };

        if result.status == SolveStatus::Success {
            PathAnnotator::annotate(
                &mut result,
                RoadNetwork::Matrix {
                    distances: &matrix.distances,
                    location_ids: &matrix.location_ids,
                },
            );
            RouteStatsService::add_statistics(&mut result, vehicles);
            self.result_cache.put(fingerprint, &result);
        }

        Ok(result)
    }

    /// Deterministic hash of the canonicalized request: sorted entity
    /// lists, the effective flags, and the normalized traffic map.
    fn fingerprint(
        &self,
        locations: &[Location],
        vehicles: &[Vehicle],
        deliveries: &[Delivery],
        options: &OptimizeOptions,
        use_api: bool,
    ) -> String {
        let mut locations: Vec<&Location> = locations.iter().collect();
        locations.sort_by(|a, b| a.id.cmp(&b.id));
        let mut vehicles: Vec<&Vehicle> = vehicles.iter().collect();
        vehicles.sort_by(|a, b| a.id.cmp(&b.id));
        let mut deliveries: Vec<&Delivery> = deliveries.iter().collect();
        deliveries.sort_by(|a, b| a.id.cmp(&b.id));

        let traffic: std::collections::BTreeMap<String, f64> = options
            .traffic_data
            .iter()
            .flatten()
            .map(|(&(from, to), &factor)| (format!("{from}-{to}"), factor))
            .collect();

        let key_parts = json!({
            "locations": locations,
            "vehicles": vehicles,
            "deliveries": deliveries,
            "consider_traffic": options.consider_traffic,
            "consider_time_windows": options.consider_time_windows,
            "use_api": use_api,
            "traffic_data": traffic,
        });

        let digest = crate::cache::hex_digest(key_parts.to_string().as_bytes());
        format!("opt_result_{digest}")
    }
}

fn validate_inputs(
    locations: &[Location],
    vehicles: &[Vehicle],
    deliveries: &[Delivery],
) -> Result<(), OptimizerError> {
    let invalid = |message: String| Err(OptimizerError::InvalidInput(message));

    if locations.is_empty() {
        return invalid("No locations provided".to_string());
    }
    if vehicles.is_empty() {
        return invalid("No vehicles provided".to_string());
    }

    for loc in locations {
        if !(-90.0..=90.0).contains(&loc.latitude) || !loc.latitude.is_finite() {
            return invalid(format!(
                "Location {} has invalid latitude: {}",
                loc.id, loc.latitude
            ));
        }
        if !(-180.0..=180.0).contains(&loc.longitude) || !loc.longitude.is_finite() {
            return invalid(format!(
                "Location {} has invalid longitude: {}",
                loc.id, loc.longitude
            ));
        }
        if let (Some(start), Some(end)) = (loc.time_window_start, loc.time_window_end) {
            if start > end {
                return invalid(format!(
                    "Location {} has invalid time window: {start} > {end}",
                    loc.id
                ));
            }
        }
    }

    let location_ids: std::collections::HashSet<&str> =
        locations.iter().map(|l| l.id.as_str()).collect();

    for vehicle in vehicles {
        if vehicle.capacity <= 0.0 {
            return invalid(format!(
                "Vehicle {} has invalid capacity: {}",
                vehicle.id, vehicle.capacity
            ));
        }
        if !location_ids.contains(vehicle.start_location_id.as_str()) {
            return invalid(format!(
                "Vehicle {} has invalid start location: {}",
                vehicle.id, vehicle.start_location_id
            ));
        }
        if let Some(end) = &vehicle.end_location_id {
            if !location_ids.contains(end.as_str()) {
                return invalid(format!(
                    "Vehicle {} has invalid end location: {end}",
                    vehicle.id
                ));
            }
        }
    }

    for delivery in deliveries {
        if delivery.demand < 0.0 {
            return invalid(format!(
                "Delivery {} has negative demand: {}",
                delivery.id, delivery.demand
            ));
        }
        if !location_ids.contains(delivery.location_id.as_str()) {
            return invalid(format!(
                "Delivery {} has invalid location: {}",
                delivery.id, delivery.location_id
            ));
        }
    }

    Ok(())
}
