//! End-to-end planning scenarios driven through the service layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use route_optimizer::config::Settings;
use route_optimizer::core::matrix::haversine_km;
use route_optimizer::domain::{Delivery, Location, RerouteReason, SolveStatus, Vehicle};
use route_optimizer::services::optimization::{OptimizationService, OptimizeOptions};
use route_optimizer::services::rerouting::ReroutingService;

fn test_settings() -> Settings {
    Settings {
        solver_time_limit: Duration::from_millis(300),
        ..Settings::default()
    }
}

fn optimization_service() -> OptimizationService {
    OptimizationService::new(test_settings(), None)
}

fn square_locations() -> Vec<Location> {
    vec![
        Location::depot("depot", 0.0, 0.0),
        Location::new("c1", 0.05, 0.0),
        Location::new("c2", 0.0, 0.05),
        Location::new("c3", 0.05, 0.05),
    ]
}

fn deliveries_of(demand: f64) -> Vec<Delivery> {
    vec![
        Delivery::new("d1", "c1", demand),
        Delivery::new("d2", "c2", demand),
        Delivery::new("d3", "c3", demand),
    ]
}

#[tokio::test]
async fn happy_path_single_vehicle_round_trip() {
    let service = optimization_service();
    let locations = square_locations();
    let vehicles = vec![Vehicle::new("v1", 20.0, "depot")];
    let deliveries = deliveries_of(5.0);

    let result = service
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;

    assert_eq!(result.status, SolveStatus::Success);
    assert!(result.unassigned_deliveries.is_empty());
    assert_eq!(result.routes.len(), 1);

    let route = &result.routes[0];
    assert_eq!(route.first().map(String::as_str), Some("depot"));
    assert_eq!(route.last().map(String::as_str), Some("depot"));
    for customer in ["c1", "c2", "c3"] {
        assert_eq!(route.iter().filter(|s| s.as_str() == customer).count(), 1);
    }

    // The reported total matches the Haversine tour length of the chosen
    // stop order (within integer-scaling truncation).
    let coord = |id: &str| {
        let loc = locations.iter().find(|l| l.id == id).unwrap();
        (loc.latitude, loc.longitude)
    };
    let tour: f64 = route
        .windows(2)
        .map(|pair| {
            let (lat1, lon1) = coord(&pair[0]);
            let (lat2, lon2) = coord(&pair[1]);
            haversine_km(lat1, lon1, lat2, lon2)
        })
        .sum();
    assert!((result.total_distance - tour).abs() < 0.05);

    // Annotated segments trace every consecutive stop pair.
    let detailed = &result.detailed_routes[0];
    assert_eq!(detailed.segments.len(), route.len() - 1);
    for (segment, pair) in detailed.segments.iter().zip(route.windows(2)) {
        assert_eq!(segment.from_location, pair[0]);
        assert_eq!(segment.to_location, pair[1]);
        assert!(segment.error.is_none());
    }
}

#[tokio::test]
async fn capacity_split_across_two_vehicles() {
    let service = optimization_service();
    let locations = square_locations();
    let vehicles = vec![
        Vehicle::new("v1", 10.0, "depot"),
        Vehicle::new("v2", 10.0, "depot"),
    ];
    let deliveries = deliveries_of(5.0);

    let result = service
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;

    assert_eq!(result.status, SolveStatus::Success);
    assert!(result.unassigned_deliveries.is_empty());
    assert_eq!(result.routes.len(), 2);

    for route in &result.detailed_routes {
        let load: f64 = deliveries
            .iter()
            .filter(|d| route.stops.contains(&d.location_id))
            .map(|d| d.demand)
            .sum();
        assert!(load <= 10.0, "route load {load} exceeds capacity");
    }

    // Every customer is covered exactly once across the two routes.
    for customer in ["c1", "c2", "c3"] {
        let visits: usize = result
            .routes
            .iter()
            .map(|r| r.iter().filter(|s| s.as_str() == customer).count())
            .sum();
        assert_eq!(visits, 1, "{customer} visited {visits} times");
    }
}

#[tokio::test]
async fn time_window_arrivals_fall_inside_windows() {
    let service = optimization_service();
    // Windows sized for the default 50 km/h planning speed.
    let locations = vec![
        Location::depot("depot", 0.0, 0.0).with_time_window(0, 1440),
        Location::new("c1", 0.05, 0.0)
            .with_time_window(0, 120)
            .with_service_time(10),
        Location::new("c2", 0.0, 0.05)
            .with_time_window(0, 240)
            .with_service_time(15),
        Location::new("c3", 0.05, 0.05)
            .with_time_window(0, 300)
            .with_service_time(5),
    ];
    let vehicles = vec![Vehicle::new("v1", 20.0, "depot")];
    let deliveries = deliveries_of(5.0);

    let result = service
        .optimize(
            &locations,
            &vehicles,
            &deliveries,
            &OptimizeOptions {
                consider_time_windows: true,
                ..OptimizeOptions::default()
            },
        )
        .await;

    assert_eq!(result.status, SolveStatus::Success);
    assert!(result.unassigned_deliveries.is_empty());

    let route = &result.detailed_routes[0];
    assert!(!route.estimated_arrival_times.is_empty());
    for location in &locations {
        let Some(&arrival_seconds) = route.estimated_arrival_times.get(&location.id) else {
            continue;
        };
        let arrival_minutes = arrival_seconds as f64 / 60.0;
        let start = location.time_window_start.unwrap() as f64;
        let end = location.time_window_end.unwrap() as f64;
        assert!(
            arrival_minutes >= start && arrival_minutes <= end,
            "arrival at {} = {arrival_minutes} outside [{start}, {end}]",
            location.id
        );
    }
}

#[tokio::test]
async fn empty_problem_yields_trivial_depot_routes() {
    let service = optimization_service();
    let locations = vec![Location::depot("depot", 0.0, 0.0)];
    let vehicles = vec![Vehicle::new("v1", 10.0, "depot")];

    let result = service
        .optimize(&locations, &vehicles, &[], &OptimizeOptions::default())
        .await;

    assert_eq!(result.status, SolveStatus::Success);
    assert_eq!(result.routes, vec![vec!["depot".to_string(), "depot".to_string()]]);
    assert_eq!(
        result.statistics.info.as_deref(),
        Some("Empty problem: direct depot-to-depot routes created")
    );
}

#[tokio::test]
async fn reroute_for_roadblock_avoids_blocked_segment() {
    let optimization = Arc::new(optimization_service());
    let rerouting = ReroutingService::new(optimization.clone());
    let locations = square_locations();
    let vehicles = vec![Vehicle::new("v1", 20.0, "depot")];
    let deliveries = deliveries_of(5.0);

    let initial = optimization
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;
    assert_eq!(initial.status, SolveStatus::Success);

    let blocked = vec![("c1".to_string(), "c2".to_string())];
    let rerouted = rerouting
        .reroute_for_roadblock(&initial, &locations, &vehicles, &deliveries, &[], &blocked)
        .await;

    assert_eq!(rerouted.status, SolveStatus::Success);
    for route in &rerouted.routes {
        for pair in route.windows(2) {
            let arc = (pair[0].as_str(), pair[1].as_str());
            assert_ne!(arc, ("c1", "c2"), "plan drives the blocked segment");
            assert_ne!(arc, ("c2", "c1"), "plan drives the blocked segment");
        }
    }

    let info = rerouted.statistics.rerouting_info.as_ref().unwrap();
    assert_eq!(info.reason, RerouteReason::Roadblock);
    assert_eq!(info.blocked_segments.len(), 1);
}

#[tokio::test]
async fn reroute_preserves_completed_deliveries() {
    let optimization = Arc::new(optimization_service());
    let rerouting = ReroutingService::new(optimization.clone());
    let locations = square_locations();
    let vehicles = vec![Vehicle::new("v1", 20.0, "depot")];
    let deliveries = deliveries_of(5.0);

    let initial = optimization
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;

    let completed = vec!["d1".to_string()];
    let traffic = HashMap::from([((0usize, 2usize), 2.0)]);
    let rerouted = rerouting
        .reroute_for_traffic(&initial, &locations, &vehicles, &deliveries, &completed, &traffic)
        .await;

    assert_eq!(rerouted.status, SolveStatus::Success);
    // d1 is done: it neither reappears as unassigned nor needs a visit.
    assert!(!rerouted.unassigned_deliveries.contains(&"d1".to_string()));
    let info = rerouted.statistics.rerouting_info.as_ref().unwrap();
    assert_eq!(info.completed_deliveries, 1);
    assert_eq!(info.remaining_deliveries, 2);
}

#[tokio::test]
async fn roadblock_isolating_every_customer_fails_with_diagnostic() {
    let optimization = Arc::new(optimization_service());
    let locations = square_locations();
    let vehicles = vec![Vehicle::new("v1", 20.0, "depot")];
    let deliveries = deliveries_of(5.0);

    // Prohibit every arc in the matrix: nothing is reachable any more.
    let mut factors = HashMap::new();
    for from in 0..4usize {
        for to in 0..4usize {
            if from != to {
                factors.insert((from, to), f64::INFINITY);
            }
        }
    }

    let result = optimization
        .optimize(
            &locations,
            &vehicles,
            &deliveries,
            &OptimizeOptions {
                consider_traffic: true,
                traffic_data: Some(factors),
                ..OptimizeOptions::default()
            },
        )
        .await;

    assert_eq!(result.status, SolveStatus::Failed);
    assert_eq!(result.statistics.error.as_deref(), Some("No solution found!"));
    assert_eq!(result.unassigned_deliveries.len(), 3);
}

#[tokio::test]
async fn identical_requests_return_identical_plans() {
    let service = optimization_service();
    let locations = square_locations();
    let vehicles = vec![Vehicle::new("v1", 20.0, "depot")];
    let deliveries = deliveries_of(5.0);

    let first = service
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;
    let second = service
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;

    assert_eq!(first, second);
}
