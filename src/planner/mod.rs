use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::matrix::{build_local_matrix, sanitize, MatrixBuildOptions};
use crate::domain::{Delivery, Location, SolveStatus, Vehicle};
use crate::solver::VrpSolver;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Shipment lifecycle as driven by the planner and the field/driver API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    Scheduled,
    Dispatched,
    InTransit,
    Delivered,
    Failed,
}

impl ShipmentStatus {
    /// `failed` is reachable from any active state; `pending` only from
    /// `scheduled` or `failed`; everything else moves strictly forward.
    pub fn can_transition_to(self, next: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        match (self, next) {
            (Pending, Scheduled) => true,
            (Scheduled, Dispatched) => true,
            (Dispatched, InTransit) => true,
            (InTransit, Delivered) => true,
            (Pending | Scheduled | Dispatched | InTransit, Failed) => true,
            (Scheduled | Failed, Pending) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("invalid shipment status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },
    #[error("optimization failed: {0}")]
    Optimization(String),
}

/// Read-model shipment as supplied by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub id: String,
    pub order_id: String,
    pub origin: LatLng,
    pub destination: LatLng,
    pub demand: f64,
    pub status: ShipmentStatus,
}

impl ShipmentRecord {
    pub fn transition(&mut self, next: ShipmentStatus) -> Result<(), PlannerError> {
        if !self.status.can_transition_to(next) {
            return Err(PlannerError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Read-model fleet vehicle as supplied by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetVehicleRecord {
    pub id: String,
    pub capacity: f64,
    pub depot: LatLng,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopRole {
    Pickup,
    Delivery,
}

/// One task stop on an assignment. Sequence numbers increment 1..N across
/// actual task stops in route order; pure depot stops create no items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentItem {
    pub shipment_id: String,
    pub role: StopRole,
    pub sequence: u32,
    pub location: LatLng,
}

/// Planned work for one vehicle, ready for the write model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub vehicle_id: String,
    pub total_load: f64,
    pub status: String,
    pub items: Vec<AssignmentItem>,
}

/// Binds persisted fleet/shipment records to solver DTOs and maps the
/// solver output back into Assignment aggregates.
pub struct AssignmentPlanner {
    vehicles: Vec<FleetVehicleRecord>,
    shipments: Vec<ShipmentRecord>,
}

struct TaskBinding {
    shipment_idx: usize,
    role: StopRole,
}

impl AssignmentPlanner {
    pub fn new(vehicles: Vec<FleetVehicleRecord>, shipments: Vec<ShipmentRecord>) -> Self {
        Self { vehicles, shipments }
    }

    pub fn plan(&self, solver: &VrpSolver) -> Result<Vec<Assignment>, PlannerError> {
        if self.vehicles.is_empty() {
            warn!("No vehicles provided for assignment planning");
            return Ok(Vec::new());
        }
        if self.shipments.is_empty() {
            info!("No shipments to plan");
            return Ok(Vec::new());
        }

        // Dedupe coordinates into solver locations keyed by rounded lat/lng.
        let mut locations: Vec<Location> = Vec::new();
        let mut location_key_to_id: HashMap<String, String> = HashMap::new();
        let mut intern = |lat: f64, lng: f64, is_depot: bool, locations: &mut Vec<Location>| {
            let key = format!("{lat:.6}_{lng:.6}");
            if let Some(id) = location_key_to_id.get(&key) {
                return id.clone();
            }
            let id = format!("loc-{}", locations.len());
            let mut location = Location::new(id.clone(), lat, lng).with_service_time(0);
            location.is_depot = is_depot;
            locations.push(location);
            location_key_to_id.insert(key, id.clone());
            id
        };

        let mut solver_vehicles = Vec::new();
        for record in &self.vehicles {
            let depot_id = intern(record.depot.lat, record.depot.lng, true, &mut locations);
            let mut vehicle = Vehicle::new(record.id.clone(), record.capacity, depot_id.clone());
            vehicle.end_location_id = Some(depot_id);
            solver_vehicles.push(vehicle);
        }
        info!("{} vehicles prepared for VRP input", solver_vehicles.len());

        let mut tasks = Vec::new();
        let mut task_bindings: HashMap<String, TaskBinding> = HashMap::new();
        for (shipment_idx, shipment) in self.shipments.iter().enumerate() {
            let pickup_location =
                intern(shipment.origin.lat, shipment.origin.lng, false, &mut locations);
            let delivery_location = intern(
                shipment.destination.lat,
                shipment.destination.lng,
                false,
                &mut locations,
            );

            let pickup_id = format!("{}_pickup", shipment.id);
            tasks.push(Delivery::pickup(
                pickup_id.clone(),
                pickup_location,
                shipment.demand,
            ));
            task_bindings.insert(
                pickup_id,
                TaskBinding {
                    shipment_idx,
                    role: StopRole::Pickup,
                },
            );

            let delivery_id = format!("{}_delivery", shipment.id);
            tasks.push(Delivery::new(
                delivery_id.clone(),
                delivery_location,
                shipment.demand,
            ));
            task_bindings.insert(
                delivery_id,
                TaskBinding {
                    shipment_idx,
                    role: StopRole::Delivery,
                },
            );
        }
        info!(
            "{} optimizer tasks created for {} shipments",
            tasks.len(),
            self.shipments.len()
        );

        let matrix = build_local_matrix(&locations, &MatrixBuildOptions::default());
        let mut distances = matrix.distances;
        sanitize(&mut distances);

        let result = solver.solve(
            &distances,
            &matrix.location_ids,
            &solver_vehicles,
            &tasks,
            0,
            None,
        );
        info!("Optimizer finished solving, status {:?}", result.status);

        if result.status != SolveStatus::Success {
            let message = result
                .statistics
                .error
                .unwrap_or_else(|| "unknown solver error".to_string());
            return Err(PlannerError::Optimization(message));
        }

        let location_by_id: HashMap<&str, &Location> =
            locations.iter().map(|l| (l.id.as_str(), l)).collect();

        let mut assignments = Vec::new();
        for route in &result.detailed_routes {
            let mut items = Vec::new();
            let mut total_load = 0.0;
            let mut sequence = 1u32;

            for stop_id in &route.stops {
                let Some(stop) = location_by_id.get(stop_id.as_str()) else {
                    continue;
                };
                for task in tasks.iter().filter(|t| t.location_id == *stop_id) {
                    let Some(binding) = task_bindings.get(&task.id) else {
                        warn!("Could not map task {} back to a shipment", task.id);
                        continue;
                    };
                    let shipment = &self.shipments[binding.shipment_idx];
                    if binding.role == StopRole::Delivery {
                        total_load += shipment.demand;
                    }
                    items.push(AssignmentItem {
                        shipment_id: shipment.id.clone(),
                        role: binding.role,
                        sequence,
                        location: LatLng {
                            lat: stop.latitude,
                            lng: stop.longitude,
                        },
                    });
                    sequence += 1;
                }
            }

            assignments.push(Assignment {
                vehicle_id: route.vehicle_id.clone(),
                total_load,
                status: "created".to_string(),
                items,
            });
        }

        info!("{} assignments successfully created", assignments.len());
        Ok(assignments)
    }
}

/// Parses an `orders.created` event into a pending shipment. Malformed
/// events yield `None`; a missing or negative demand defaults to 0.
pub fn shipment_from_order_event(event: &Value) -> Option<ShipmentRecord> {
    let order_id = event.get("order_id")?;
    let order_id = match order_id {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    let coords = |value: &Value| -> Option<LatLng> {
        Some(LatLng {
            lat: value.get("lat")?.as_f64()?,
            lng: value.get("lng")?.as_f64()?,
        })
    };
    let origin = coords(event.get("origin")?)?;
    let destination = coords(event.get("destination")?)?;

    let demand = match event.get("demand").and_then(Value::as_f64) {
        Some(value) if value >= 0.0 => value,
        Some(value) => {
            warn!("Invalid demand {value} in order event, defaulting to 0");
            0.0
        }
        None => 0.0,
    };

    Some(ShipmentRecord {
        id: format!("shp-{order_id}"),
        order_id,
        origin,
        destination,
        demand,
        status: ShipmentStatus::Pending,
    })
}
