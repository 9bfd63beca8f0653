//! REST API for parcel dispatch.
//!
//! Provides endpoints for:
//! - Demo data retrieval
//! - Plan management (create, get, list, delete)
//! - Point-in-time parcel status queries
//! - Swagger UI at /q/swagger-ui

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::demo_data::{available_datasets, generate_by_name};
use crate::domain::ParcelId;
use crate::dto::{
    AddressDto, CreatePlanRequest, DatasetDto, ErrorResponse, HealthResponse, InfoResponse, ParcelDto,
    ParcelStatusDto, PlanDto, TimeQuery, VehiclePlanDto,
};
use crate::error::DispatchError;
use crate::service::DispatchService;

/// Application state shared across handlers.
pub struct AppState {
    pub service: DispatchService,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            service: DispatchService::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates the API router with CORS and Swagger UI enabled.
pub fn create_router() -> Router {
    let state = Arc::new(AppState::new());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{name}", get(get_demo_data))
        // Plans
        .route("/plans", get(list_plans).post(create_plan))
        .route("/plans/{id}", get(get_plan).delete(delete_plan))
        .route("/plans/{id}/parcels", get(get_parcel_statuses))
        .route("/plans/{id}/parcels/{parcel}", get(get_parcel_status))
        // Swagger UI at /q/swagger-ui (Quarkus-style path)
        .merge(SwaggerUi::new("/q/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Error Mapping
// ============================================================================

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::InvalidTimeInput(_)
            | DispatchError::InvalidConfig(_)
            | DispatchError::MalformedRecord { .. }
            | DispatchError::Csv(_)
            | DispatchError::Json(_) => StatusCode::BAD_REQUEST,
            DispatchError::UnknownParcel(_) | DispatchError::UnknownDataset(_) | DispatchError::UnknownJob(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

// ============================================================================
// Health & Info
// ============================================================================

/// GET /health - Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

/// GET /info - Application info endpoint.
#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "Application info", body = InfoResponse))
)]
async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Parcel Dispatch",
        version: env!("CARGO_PKG_VERSION"),
        planner_engine: "nearest-neighbor with deadline repair",
    })
}

// ============================================================================
// Demo Data
// ============================================================================

/// GET /demo-data - List available demo datasets.
#[utoipa::path(
    get,
    path = "/demo-data",
    responses((status = 200, description = "List of demo dataset names", body = Vec<String>))
)]
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(available_datasets().to_vec())
}

/// GET /demo-data/{name} - Get a specific demo dataset.
#[utoipa::path(
    get,
    path = "/demo-data/{name}",
    params(("name" = String, Path, description = "Demo dataset name")),
    responses(
        (status = 200, description = "Demo data retrieved", body = DatasetDto),
        (status = 404, description = "Dataset not found", body = ErrorResponse)
    )
)]
async fn get_demo_data(Path(name): Path<String>) -> Result<Json<DatasetDto>, DispatchError> {
    let dataset = generate_by_name(&name)?;
    Ok(Json(DatasetDto::from_dataset(&dataset)))
}

// ============================================================================
// Plan Handlers
// ============================================================================

/// POST /plans - Create a plan for a demo dataset and run the planner.
#[utoipa::path(
    post,
    path = "/plans",
    request_body = CreatePlanRequest,
    responses(
        (status = 201, description = "Plan created", body = PlanDto),
        (status = 400, description = "Invalid configuration", body = ErrorResponse),
        (status = 404, description = "Dataset not found", body = ErrorResponse)
    )
)]
async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanDto>), Response> {
    let dataset = generate_by_name(&request.dataset).map_err(IntoResponse::into_response)?;
    let config = request.config.unwrap_or_default();
    let id = Uuid::new_v4().to_string();
    let job = state
        .service
        .create_job(id.clone(), dataset, config)
        .map_err(IntoResponse::into_response)?;

    let runner = state.clone();
    let planned = tokio::task::spawn_blocking(move || runner.service.run_plan(&id)).await;
    match planned {
        Ok(Ok(_)) => Ok((StatusCode::CREATED, Json(PlanDto::from_job(&job.read())))),
        Ok(Err(e)) => Err(e.into_response()),
        Err(e) => {
            tracing::error!("Planning task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

/// GET /plans - List all plan IDs.
#[utoipa::path(
    get,
    path = "/plans",
    responses((status = 200, description = "List of plan IDs", body = Vec<String>))
)]
async fn list_plans(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.service.list_jobs())
}

/// GET /plans/{id} - Get the current plan.
#[utoipa::path(
    get,
    path = "/plans/{id}",
    params(("id" = String, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan retrieved", body = PlanDto),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlanDto>, DispatchError> {
    let job = state.service.job(&id)?;
    let guard = job.read();
    Ok(Json(PlanDto::from_job(&guard)))
}

/// DELETE /plans/{id} - Remove a plan and return its final state.
#[utoipa::path(
    delete,
    path = "/plans/{id}",
    params(("id" = String, Path, description = "Plan ID")),
    responses(
        (status = 200, description = "Plan removed", body = PlanDto),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn delete_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlanDto>, DispatchError> {
    let job = state
        .service
        .remove_job(&id)
        .ok_or(DispatchError::UnknownJob(id))?;
    let guard = job.read();
    Ok(Json(PlanDto::from_job(&guard)))
}

/// GET /plans/{id}/parcels?time=HH:MM:SS - Every parcel's status at a time of day.
///
/// Corrections due by `time` are applied to the plan first.
#[utoipa::path(
    get,
    path = "/plans/{id}/parcels",
    params(("id" = String, Path, description = "Plan ID"), TimeQuery),
    responses(
        (status = 200, description = "Parcel statuses", body = Vec<ParcelStatusDto>),
        (status = 400, description = "Invalid time", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_parcel_statuses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<TimeQuery>,
) -> Result<Json<Vec<ParcelStatusDto>>, DispatchError> {
    let job = state.service.job(&id)?;
    let snapshots = job.write().status_at(&query.time)?;
    Ok(Json(snapshots.iter().map(ParcelStatusDto::from).collect()))
}

/// GET /plans/{id}/parcels/{parcel}?time=HH:MM:SS - One parcel's status at a time of day.
#[utoipa::path(
    get,
    path = "/plans/{id}/parcels/{parcel}",
    params(
        ("id" = String, Path, description = "Plan ID"),
        ("parcel" = u32, Path, description = "Parcel ID"),
        TimeQuery
    ),
    responses(
        (status = 200, description = "Parcel status", body = ParcelStatusDto),
        (status = 400, description = "Invalid time", body = ErrorResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    )
)]
async fn get_parcel_status(
    State(state): State<Arc<AppState>>,
    Path((id, parcel)): Path<(String, ParcelId)>,
    Query(query): Query<TimeQuery>,
) -> Result<Json<ParcelStatusDto>, DispatchError> {
    let job = state.service.job(&id)?;
    let snapshot = job.write().parcel_status_at(parcel, &query.time)?;
    Ok(Json(ParcelStatusDto::from(&snapshot)))
}

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        info,
        list_demo_data,
        get_demo_data,
        create_plan,
        list_plans,
        get_plan,
        delete_plan,
        get_parcel_statuses,
        get_parcel_status,
    ),
    components(schemas(
        HealthResponse,
        InfoResponse,
        ErrorResponse,
        AddressDto,
        ParcelDto,
        DatasetDto,
        CreatePlanRequest,
        VehiclePlanDto,
        PlanDto,
        ParcelStatusDto,
    ))
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    async fn call(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn create_scenario_plan(router: &Router) -> PlanDto {
        let (status, body) = call(router, "POST", "/plans", Some(r#"{"dataset":"SCENARIO"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        parse(&body)
    }

    #[tokio::test]
    async fn test_health() {
        let router = create_router();
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<serde_json::Value>(&body)["status"], "UP");
    }

    #[tokio::test]
    async fn test_demo_data() {
        let router = create_router();
        let (_, body) = call(&router, "GET", "/demo-data", None).await;
        assert_eq!(parse::<Vec<String>>(&body), vec!["SALT_LAKE", "SCENARIO"]);

        let (status, body) = call(&router, "GET", "/demo-data/salt_lake", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<DatasetDto>(&body).parcels.len(), 40);

        let (status, _) = call(&router, "GET", "/demo-data/ATLANTIS", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_plan_lifecycle() {
        let router = create_router();
        let plan = create_scenario_plan(&router).await;
        assert_eq!(plan.status, "PLANNED");
        assert_eq!(plan.held, vec![1]);

        let (_, body) = call(&router, "GET", "/plans", None).await;
        assert_eq!(parse::<Vec<String>>(&body), vec![plan.id.clone()]);

        let uri = format!("/plans/{}", plan.id);
        let (status, body) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parse::<PlanDto>(&body).dataset, "SCENARIO");

        let (status, _) = call(&router, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_config_is_bad_request() {
        let router = create_router();
        let (status, body) = call(
            &router,
            "POST",
            "/plans",
            Some(r#"{"dataset":"SCENARIO","config":{"vehicleCount":0}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", String::from_utf8_lossy(&body));

        // Config keys are camelCase; anything else fails to deserialize.
        let (status, _) = call(
            &router,
            "POST",
            "/plans",
            Some(r#"{"dataset":"SCENARIO","config":{"vehicle_count":0}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &router,
            "POST",
            "/plans",
            Some(r#"{"dataset":"SCENARIO","config":{"driverCount":1}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_parcel_status_queries() {
        let router = create_router();
        let plan = create_scenario_plan(&router).await;

        let uri = format!("/plans/{}/parcels?time=08:00:00", plan.id);
        let (status, body) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let statuses: Vec<ParcelStatusDto> = parse(&body);
        assert_eq!(statuses.len(), 6);
        assert_eq!(statuses[0].status, "HELD");

        let uri = format!("/plans/{}/parcels/1?time=17:00:00", plan.id);
        let (status, body) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let p1: ParcelStatusDto = parse(&body);
        assert_eq!(p1.status, "DELIVERED");
        assert!(p1.address.starts_with("410 S State St"));
    }

    #[tokio::test]
    async fn test_parcel_status_errors() {
        let router = create_router();
        let plan = create_scenario_plan(&router).await;

        let uri = format!("/plans/{}/parcels?time=noonish", plan.id);
        let (status, body) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(parse::<ErrorResponse>(&body).error.contains("noonish"));

        let uri = format!("/plans/{}/parcels/999?time=09:00:00", plan.id);
        let (status, _) = call(&router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&router, "GET", "/plans/missing/parcels?time=09:00:00", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
