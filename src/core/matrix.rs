use std::collections::HashMap;

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::api::google::RoutingApiClient;
use crate::cache::MatrixCache;
use crate::config::constant::{EARTH_RADIUS_KM, MAX_SAFE_DISTANCE, MAX_SAFE_TRAFFIC_FACTOR};
use crate::config::Settings;
use crate::core::dijkstra::Graph;
use crate::domain::Location;

/// NxN distance matrix in kilometres with an optional parallel time matrix
/// in minutes. Row/column `i` corresponds to `location_ids[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    pub distances: Vec<Vec<f64>>,
    pub times: Option<Vec<Vec<f64>>>,
    pub location_ids: Vec<String>,
}

impl DistanceMatrix {
    pub fn empty() -> Self {
        Self {
            distances: Vec::new(),
            times: None,
            location_ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.location_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.location_ids.is_empty()
    }

    pub fn index_of(&self, location_id: &str) -> Option<usize> {
        self.location_ids.iter().position(|id| id == location_id)
    }
}

#[derive(Debug, Clone)]
pub struct MatrixBuildOptions {
    pub use_api: bool,
    pub api_key: Option<String>,
    /// Haversine when true, planar Euclidean otherwise.
    pub use_haversine: bool,
    /// When set (> 0), the local path estimates times as distance/speed.
    pub average_speed_kmh: Option<f64>,
    pub use_cache: bool,
}

impl Default for MatrixBuildOptions {
    fn default() -> Self {
        Self {
            use_api: false,
            api_key: None,
            use_haversine: true,
            average_speed_kmh: None,
            use_cache: true,
        }
    }
}

/// Great-circle distance between two coordinates, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
}

/// Planar distance in coordinate degrees, useful in tests and as a cheap
/// fallback.
pub fn euclidean(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    ((lat2 - lat1).powi(2) + (lon2 - lon1).powi(2)).sqrt()
}

/// Builds distance (and optionally time) matrices locally, without any
/// external backend.
pub fn build_local_matrix(locations: &[Location], options: &MatrixBuildOptions) -> DistanceMatrix {
    let n = locations.len();
    if n == 0 {
        return DistanceMatrix::empty();
    }

    let mut distances = vec![vec![0.0; n]; n];
    for (i, j) in (0..n).cartesian_product(0..n) {
        if i == j {
            continue;
        }
        let (a, b) = (&locations[i], &locations[j]);
        distances[i][j] = if options.use_haversine {
            haversine_km(a.latitude, a.longitude, b.latitude, b.longitude)
        } else {
            euclidean(a.latitude, a.longitude, b.latitude, b.longitude)
        };
    }

    let times = match options.average_speed_kmh {
        Some(speed) if speed > 0.0 => {
            let mut times = vec![vec![0.0; n]; n];
            for (i, j) in (0..n).cartesian_product(0..n) {
                if distances[i][j] > 0.0 {
                    times[i][j] = distances[i][j] / speed * 60.0;
                }
            }
            Some(times)
        }
        _ => None,
    };

    DistanceMatrix {
        distances,
        times,
        location_ids: locations.iter().map(|l| l.id.clone()).collect(),
    }
}

/// Replaces non-finite, negative, or excessively large entries with safe
/// bounded values and zeroes the diagonal.
pub fn sanitize(matrix: &mut [Vec<f64>]) {
    for (i, row) in matrix.iter_mut().enumerate() {
        for (j, value) in row.iter_mut().enumerate() {
            if i == j {
                *value = 0.0;
            } else if value.is_nan() || value.is_infinite() || *value > MAX_SAFE_DISTANCE {
                *value = MAX_SAFE_DISTANCE;
            } else if *value < 0.0 {
                *value = 0.0;
            }
        }
    }
}

/// Applies index-keyed traffic factors in place. Finite factors are
/// clamped to `1.0..=MAX_SAFE_TRAFFIC_FACTOR`; a non-finite factor marks a
/// roadblock and raises the cell to MAX_SAFE_DISTANCE so the arc is never
/// chosen. Invalid indices are skipped with a warning. Callers should
/// re-run [`sanitize`] afterwards.
pub fn apply_traffic_factors(matrix: &mut [Vec<f64>], factors: &HashMap<(usize, usize), f64>) {
    let rows = matrix.len();
    for (&(from_idx, to_idx), &factor) in factors {
        if from_idx >= rows || matrix.get(from_idx).map_or(true, |r| to_idx >= r.len()) {
            warn!(
                "Invalid indices ({}, {}) in traffic data, skipping",
                from_idx, to_idx
            );
            continue;
        }
        if !factor.is_finite() {
            matrix[from_idx][to_idx] = MAX_SAFE_DISTANCE;
            continue;
        }
        let safe_factor = factor.clamp(1.0, MAX_SAFE_TRAFFIC_FACTOR);
        if safe_factor != factor {
            warn!(
                "Traffic factor {} for ({}, {}) adjusted to {}",
                factor, from_idx, to_idx, safe_factor
            );
        }
        matrix[from_idx][to_idx] *= safe_factor;
    }
}

/// Converts a distance matrix into the adjacency-map graph consumed by the
/// shortest-path kernel. Self-edges are skipped.
pub fn matrix_to_graph(distances: &[Vec<f64>], location_ids: &[String]) -> Graph {
    let mut graph: Graph = location_ids
        .iter()
        .map(|id| (id.clone(), HashMap::new()))
        .collect();
    for (i, from_id) in location_ids.iter().enumerate() {
        let edges = graph.get_mut(from_id).expect("node inserted above");
        for (j, to_id) in location_ids.iter().enumerate() {
            if i != j {
                edges.insert(to_id.clone(), distances[i][j]);
            }
        }
    }
    graph
}

/// Orchestrates matrix construction: external routing backend with a
/// persistent cache when requested, local Haversine otherwise. Any failure
/// on the API path falls back to the local calculation.
pub struct MatrixBuilder {
    settings: Settings,
    api: RoutingApiClient,
    cache: Option<MatrixCache>,
}

impl MatrixBuilder {
    pub fn new(settings: Settings, cache: Option<MatrixCache>) -> Self {
        let api = RoutingApiClient::new(settings.clone());
        Self {
            settings,
            api,
            cache,
        }
    }

    pub async fn build(
        &self,
        locations: &[Location],
        options: &MatrixBuildOptions,
    ) -> DistanceMatrix {
        if locations.is_empty() {
            return DistanceMatrix::empty();
        }

        let api_key = options
            .api_key
            .clone()
            .or_else(|| self.settings.google_maps_api_key.clone());

        if options.use_api {
            match api_key {
                Some(key) => match self.build_from_api(locations, &key, options.use_cache).await {
                    Ok(matrix) => return matrix,
                    Err(e) => {
                        warn!("API distance calculation failed: {e}. Falling back to Haversine.")
                    }
                },
                None => warn!("No routing API key available, falling back to Haversine"),
            }
        }

        build_local_matrix(locations, options)
    }

    async fn build_from_api(
        &self,
        locations: &[Location],
        api_key: &str,
        use_cache: bool,
    ) -> Result<DistanceMatrix, crate::api::google::ApiError> {
        let location_ids: Vec<String> = locations.iter().map(|l| l.id.clone()).collect();

        if use_cache {
            if let Some(cache) = &self.cache {
                if let Some(hit) = cache
                    .get(&location_ids, self.settings.cache_expiry_days)
                    .await
                {
                    info!("Using cached distance and time matrix");
                    return Ok(hit);
                }
            }
        }

        let (distances, times) = self.api.fetch_matrices(locations, api_key).await?;
        debug!(
            "Fetched {}x{} matrix from routing API",
            distances.len(),
            distances.first().map_or(0, Vec::len)
        );

        let matrix = DistanceMatrix {
            distances,
            times: Some(times),
            location_ids,
        };

        if use_cache {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.upsert(&matrix).await {
                    warn!("Error caching matrix: {e}");
                }
            }
        }

        Ok(matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(values: &[&[f64]]) -> Vec<Vec<f64>> {
        values.iter().map(|row| row.to_vec()).collect()
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_self() {
        let d1 = haversine_km(1.3521, 103.8198, 1.29, 103.85);
        let d2 = haversine_km(1.29, 103.85, 1.3521, 103.8198);
        assert!((d1 - d2).abs() < 1e-9);
        assert_eq!(haversine_km(1.0, 2.0, 1.0, 2.0), 0.0);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn empty_location_list_builds_empty_matrix() {
        let matrix = build_local_matrix(&[], &MatrixBuildOptions::default());
        assert!(matrix.is_empty());
        assert!(matrix.distances.is_empty());
        assert!(matrix.times.is_none());
    }

    #[test]
    fn local_build_estimates_times_from_speed() {
        let locations = vec![
            Location::depot("depot", 0.0, 0.0),
            Location::new("c1", 1.0, 0.0),
        ];
        let options = MatrixBuildOptions {
            average_speed_kmh: Some(60.0),
            ..MatrixBuildOptions::default()
        };
        let matrix = build_local_matrix(&locations, &options);
        let times = matrix.times.expect("time matrix should be estimated");
        assert!((times[0][1] - matrix.distances[0][1]).abs() < 1e-9);
        assert_eq!(times[0][0], 0.0);
    }

    #[test]
    fn sanitize_bounds_every_entry() {
        let mut matrix = square(&[
            &[5.0, f64::NAN, f64::INFINITY],
            &[-3.0, 0.0, 2e7],
            &[1.0, f64::NEG_INFINITY, 0.5],
        ]);
        sanitize(&mut matrix);
        for (i, row) in matrix.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                assert!(value.is_finite());
                assert!(*value >= 0.0);
                assert!(*value <= MAX_SAFE_DISTANCE);
                if i == j {
                    assert_eq!(*value, 0.0);
                }
            }
        }
        assert_eq!(matrix[0][1], MAX_SAFE_DISTANCE);
        assert_eq!(matrix[1][0], 0.0);
        assert_eq!(matrix[1][2], MAX_SAFE_DISTANCE);
    }

    #[test]
    fn traffic_factors_are_monotone_and_clamped() {
        let mut matrix = square(&[&[0.0, 10.0], &[10.0, 0.0]]);
        let factors = HashMap::from([
            ((0usize, 1usize), 0.5), // floored to 1.0
            ((1usize, 0usize), 9.0), // capped to 5.0
        ]);
        apply_traffic_factors(&mut matrix, &factors);
        assert_eq!(matrix[0][1], 10.0);
        assert_eq!(matrix[1][0], 50.0);
    }

    #[test]
    fn infinite_factor_prohibits_the_arc() {
        let mut matrix = square(&[&[0.0, 10.0], &[10.0, 0.0]]);
        let factors = HashMap::from([((0usize, 1usize), f64::INFINITY)]);
        apply_traffic_factors(&mut matrix, &factors);
        assert_eq!(matrix[0][1], MAX_SAFE_DISTANCE);
        assert_eq!(matrix[1][0], 10.0);
    }

    #[test]
    fn out_of_range_indices_are_skipped() {
        let mut matrix = square(&[&[0.0, 1.0], &[1.0, 0.0]]);
        let factors = HashMap::from([((7usize, 0usize), 2.0)]);
        apply_traffic_factors(&mut matrix, &factors);
        assert_eq!(matrix, square(&[&[0.0, 1.0], &[1.0, 0.0]]));
    }

    #[test]
    fn graph_conversion_skips_self_edges() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let matrix = square(&[&[0.0, 3.0], &[4.0, 0.0]]);
        let graph = matrix_to_graph(&matrix, &ids);
        assert_eq!(graph["a"]["b"], 3.0);
        assert_eq!(graph["b"]["a"], 4.0);
        assert!(!graph["a"].contains_key("a"));
    }
}
