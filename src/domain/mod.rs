pub mod result;
pub mod traffic;
pub mod types;

pub use result::{
    DetailedRoute, OptimizationResult, RerouteReason, ReroutingInfo, RouteSegment, RouteSummary,
    SolveStatus, Statistics, VehicleCost,
};
pub use traffic::TrafficData;
pub use types::{Delivery, Location, Vehicle};
