//! DTOs for REST API requests/responses.
//!
//! Times of day are `HH:MM:SS` strings; parcels without a deadline report `"EOD"`.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::DispatchConfig;
use crate::domain::{ParcelId, VehicleId};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Status indicator ("UP" when healthy).
    pub status: &'static str,
}

/// Application info response.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    /// Planning engine name.
    pub planner_engine: &'static str,
}

/// Error body returned with every 4xx/5xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressDto {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Parcel as loaded from a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParcelDto {
    pub id: ParcelId,
    pub address: AddressDto,
    /// Deadline (`HH:MM:SS`) or `"EOD"`.
    pub deadline: String,
    pub weight: f64,
    pub notes: String,
    /// Constraint kinds in priority order, e.g. `["FLAGGED", "DELAYED"]`.
    pub constraints: Vec<String>,
}

/// Demo dataset contents.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDto {
    pub name: String,
    pub parcels: Vec<ParcelDto>,
    /// Street addresses covered by the distance table.
    pub addresses: Vec<String>,
}

/// POST /plans request body.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanRequest {
    /// Demo dataset name.
    pub dataset: String,
    /// Overrides for the default dispatch configuration.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: Option<DispatchConfig>,
}

/// One vehicle's route in a plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePlanDto {
    pub id: VehicleId,
    /// Loaded parcel ids in load order.
    pub manifest: Vec<ParcelId>,
    /// Parcel ids in delivery order.
    pub route: Vec<ParcelId>,
    pub total_distance: f64,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_time: Option<String>,
    pub final_location: String,
    /// Outcome of the deadline repair loop ("CLEAN" or "EXHAUSTED").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<String>,
}

/// A planning job and its current plan.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub id: String,
    pub dataset: String,
    /// Job status, e.g. "PLANNED".
    pub status: String,
    pub total_distance: f64,
    pub vehicles: Vec<VehiclePlanDto>,
    pub held: Vec<ParcelId>,
    pub unassigned: Vec<ParcelId>,
    pub late: Vec<ParcelId>,
    pub reoptimized: bool,
    /// "FEASIBLE" or "DEADLINES_MISSED".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub diagnostics: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A parcel's state at a time of day.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParcelStatusDto {
    pub id: ParcelId,
    /// Full destination address.
    pub address: String,
    pub deadline: String,
    pub weight: f64,
    pub notes: String,
    /// Query time.
    pub time: String,
    /// "AT_HUB", "EN_ROUTE", "DELIVERED" or "HELD".
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleId>,
    pub location: String,
    /// Delivery time, present once delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<String>,
}

/// `?time=HH:MM:SS` query parameter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct TimeQuery {
    /// Time of day, `HH:MM:SS`.
    pub time: String,
}
