use tracing::{debug, error};

use crate::core::dijkstra::{self, Graph};
use crate::core::matrix::matrix_to_graph;
use crate::domain::{DetailedRoute, OptimizationResult, RouteSegment};

/// Road network handed to the annotator: either an adjacency graph or a
/// distance matrix with its location-id ordering (converted on the fly).
pub enum RoadNetwork<'a> {
    Graph(&'a Graph),
    Matrix {
        distances: &'a [Vec<f64>],
        location_ids: &'a [String],
    },
}

/// Fills in concrete inter-stop paths on a solved result. Path-finding
/// failures are captured per segment and never abort annotation of the
/// remaining route. `total_distance` on the result is left untouched.
pub struct PathAnnotator;

impl PathAnnotator {
    pub fn annotate(result: &mut OptimizationResult, network: RoadNetwork<'_>) {
        let converted;
        let graph: &Graph = match network {
            RoadNetwork::Graph(graph) => graph,
            RoadNetwork::Matrix {
                distances,
                location_ids,
            } => {
                converted = matrix_to_graph(distances, location_ids);
                &converted
            }
        };

        ensure_detailed_routes(result);

        for route in &mut result.detailed_routes {
            if route.stops.is_empty() && !route.segments.is_empty() {
                route.stops = stops_from_segments(&route.segments);
            }

            let mut segments = Vec::new();
            for pair in route.stops.windows(2) {
                let (from, to) = (&pair[0], &pair[1]);
                let segment = match dijkstra::shortest_path(graph, from, to) {
                    Ok(Some((path, distance))) => RouteSegment {
                        from_location: from.clone(),
                        to_location: to.clone(),
                        path,
                        distance,
                        estimated_time: None,
                        error: None,
                    },
                    Ok(None) => placeholder_segment(from, to, "no path found".to_string()),
                    Err(e) => {
                        error!("Error calculating path from {from} to {to}: {e}");
                        placeholder_segment(from, to, e.to_string())
                    }
                };
                segments.push(segment);
            }
            debug!("Annotated {} segments for vehicle {}", segments.len(), route.vehicle_id);
            route.segments = segments;
        }
    }
}

/// Builds detailed-route skeletons from the plain route lists when the
/// solver did not provide them (trivial depot-to-depot plans).
fn ensure_detailed_routes(result: &mut OptimizationResult) {
    if !result.detailed_routes.is_empty() || result.routes.is_empty() {
        return;
    }
    for (route_idx, stops) in result.routes.iter().enumerate() {
        let vehicle_id = result
            .assigned_vehicles
            .iter()
            .find(|(_, &idx)| idx == route_idx)
            .map(|(id, _)| id.clone())
            .unwrap_or_else(|| format!("unknown_{route_idx}"));
        result.detailed_routes.push(DetailedRoute {
            vehicle_id,
            stops: stops.clone(),
            ..DetailedRoute::default()
        });
    }
}

fn stops_from_segments(segments: &[RouteSegment]) -> Vec<String> {
    let mut stops = vec![segments[0].from_location.clone()];
    stops.extend(segments.iter().map(|s| s.to_location.clone()));
    stops
}

fn placeholder_segment(from: &str, to: &str, error: String) -> RouteSegment {
    RouteSegment {
        from_location: from.to_string(),
        to_location: to.to_string(),
        path: vec![from.to_string(), to.to_string()],
        distance: 0.0,
        estimated_time: None,
        error: Some(error),
    }
}
