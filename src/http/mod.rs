use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::domain::{
    Delivery, DetailedRoute, Location, OptimizationResult, SolveStatus, Statistics, TrafficData,
    Vehicle,
};
use crate::error::OptimizerError;
use crate::services::optimization::{OptimizationService, OptimizeOptions};
use crate::services::rerouting::ReroutingService;

#[derive(Clone)]
pub struct AppState {
    pub optimization: Arc<OptimizationService>,
    pub rerouting: Arc<ReroutingService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/optimize", post(optimize_handler))
        .route("/reroute", post(reroute_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct OptimizeBody {
    locations: Vec<Location>,
    vehicles: Vec<Vehicle>,
    deliveries: Vec<Delivery>,
    #[serde(default)]
    consider_traffic: bool,
    #[serde(default)]
    consider_time_windows: bool,
    #[serde(default)]
    use_api: Option<bool>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    traffic_data: Option<TrafficData>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RerouteType {
    Traffic,
    Delay,
    Roadblock,
}

#[derive(Debug, Deserialize)]
struct RerouteBody {
    current_routes: OptimizationResult,
    locations: Vec<Location>,
    vehicles: Vec<Vehicle>,
    original_deliveries: Vec<Delivery>,
    #[serde(default)]
    completed_deliveries: Vec<String>,
    reroute_type: RerouteType,
    #[serde(default)]
    traffic_data: Option<TrafficData>,
    #[serde(default)]
    delayed_location_ids: Vec<String>,
    #[serde(default)]
    delay_minutes: HashMap<String, u32>,
    #[serde(default)]
    blocked_segments: Vec<(String, String)>,
}

/// Outward projection of an OptimizationResult: the field named `routes`
/// carries the detailed routes.
#[derive(Debug, Serialize)]
struct PlanResponse {
    status: SolveStatus,
    routes: Vec<DetailedRoute>,
    total_distance: f64,
    total_cost: f64,
    assigned_vehicles: BTreeMap<String, usize>,
    unassigned_deliveries: Vec<String>,
    statistics: Statistics,
}

impl From<OptimizationResult> for PlanResponse {
    fn from(result: OptimizationResult) -> Self {
        Self {
            status: result.status,
            routes: result.detailed_routes,
            total_distance: result.total_distance,
            total_cost: result.total_cost,
            assigned_vehicles: result.assigned_vehicles,
            unassigned_deliveries: result.unassigned_deliveries,
            statistics: result.statistics,
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn respond(result: OptimizationResult) -> Response {
    let status = match result.status {
        SolveStatus::Success => StatusCode::OK,
        SolveStatus::Failed | SolveStatus::Error => StatusCode::BAD_REQUEST,
    };
    (status, Json(PlanResponse::from(result))).into_response()
}

async fn optimize_handler(
    State(state): State<AppState>,
    Json(body): Json<OptimizeBody>,
) -> Response {
    let location_ids: Vec<String> = body.locations.iter().map(|l| l.id.clone()).collect();
    let traffic_data = match &body.traffic_data {
        Some(data) => match data.to_index_factors(&location_ids) {
            Ok(factors) => Some(factors),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        },
        None => None,
    };

    let options = OptimizeOptions {
        consider_traffic: body.consider_traffic,
        consider_time_windows: body.consider_time_windows,
        traffic_data,
        use_api: body.use_api,
        api_key: body.api_key.clone(),
    };

    match state
        .optimization
        .optimize_checked(&body.locations, &body.vehicles, &body.deliveries, &options)
        .await
    {
        Ok(result) => respond(result),
        Err(OptimizerError::InvalidInput(message)) => {
            error_response(StatusCode::BAD_REQUEST, &message)
        }
        Err(e) => {
            // Never surface internal error detail to clients.
            error!("Unexpected error in /optimize: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn reroute_handler(
    State(state): State<AppState>,
    Json(body): Json<RerouteBody>,
) -> Response {
    let result = match body.reroute_type {
        RerouteType::Traffic => {
            let location_ids: Vec<String> = body.locations.iter().map(|l| l.id.clone()).collect();
            let factors = match body
                .traffic_data
                .as_ref()
                .map(|data| data.to_index_factors(&location_ids))
                .transpose()
            {
                Ok(factors) => factors.unwrap_or_default(),
                Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
            };
            state
                .rerouting
                .reroute_for_traffic(
                    &body.current_routes,
                    &body.locations,
                    &body.vehicles,
                    &body.original_deliveries,
                    &body.completed_deliveries,
                    &factors,
                )
                .await
        }
        RerouteType::Delay => {
            state
                .rerouting
                .reroute_for_delay(
                    &body.current_routes,
                    &body.locations,
                    &body.vehicles,
                    &body.original_deliveries,
                    &body.completed_deliveries,
                    &body.delayed_location_ids,
                    &body.delay_minutes,
                )
                .await
        }
        RerouteType::Roadblock => {
            state
                .rerouting
                .reroute_for_roadblock(
                    &body.current_routes,
                    &body.locations,
                    &body.vehicles,
                    &body.original_deliveries,
                    &body.completed_deliveries,
                    &body.blocked_segments,
                )
                .await
        }
    };

    respond(result)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
