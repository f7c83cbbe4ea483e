//! Offline demonstration: plans a small fleet problem with the Haversine
//! backend and prints the resulting routes. Useful as a smoke check
//! without any external API or database.

use std::error::Error;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use route_optimizer::config::Settings;
use route_optimizer::domain::{Delivery, Location, Vehicle};
use route_optimizer::services::optimization::{OptimizationService, OptimizeOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let locations = vec![
        Location::depot("warehouse", 1.3521, 103.8198),
        Location::new("customer-north", 1.4300, 103.8000),
        Location::new("customer-east", 1.3600, 103.9500),
        Location::new("customer-west", 1.3400, 103.7000),
        Location::new("customer-south", 1.2700, 103.8200),
    ];
    let vehicles = vec![
        Vehicle::new("truck-1", 60.0, "warehouse"),
        Vehicle::new("truck-2", 60.0, "warehouse"),
    ];
    let deliveries = vec![
        Delivery::new("order-1", "customer-north", 25.0),
        Delivery::new("order-2", "customer-east", 30.0),
        Delivery::new("order-3", "customer-west", 20.0),
        Delivery::new("order-4", "customer-south", 15.0),
    ];

    let settings = Settings {
        solver_time_limit: Duration::from_secs(2),
        ..Settings::from_env()
    };
    let service = OptimizationService::new(settings, None);

    info!(
        "Planning {} deliveries across {} vehicles",
        deliveries.len(),
        vehicles.len()
    );
    let result = service
        .optimize(&locations, &vehicles, &deliveries, &OptimizeOptions::default())
        .await;

    println!("status: {:?}", result.status);
    println!("total distance: {:.2} km", result.total_distance);
    println!("total cost: {:.2}", result.total_cost);
    for route in &result.detailed_routes {
        println!(
            "{}: {} ({:.2} km, {:.0}% loaded)",
            route.vehicle_id,
            route.stops.join(" -> "),
            route.total_distance,
            route.capacity_utilization * 100.0
        );
    }
    if !result.unassigned_deliveries.is_empty() {
        println!("unassigned: {:?}", result.unassigned_deliveries);
    }

    Ok(())
}
