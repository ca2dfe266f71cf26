//! REST API for the load planner.
//!
//! Plans can be computed from a posted flight description or from the data
//! the cargo service currently reports. Uses Axum as the web framework and
//! supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::catalog::Catalog;
use crate::config::{ApiConfig, RemoteConfig};
use crate::model::{
    CompartmentTarget, ContainerTypeRecord, LuggageSummary, ShipmentItem, ShipmentRecord,
    ValidationError,
};
use crate::planner::{
    ClassOutcome, CompartmentPayload, CompartmentSummary, LuggageContainerPayload, Plan,
    PlanError, PlanInput, PlanSummary, Planner, PlannerConfig, ShipmentContainerPayload,
    UnallocatedContainer,
};
use crate::remote::{self, CargoService, HttpCargoService, RemoteError};

#[derive(Clone)]
struct ApiState {
    catalog: Catalog,
    planner_config: PlannerConfig,
    remote: HttpCargoService,
    submit_plan: bool,
}

impl ApiState {
    fn planner(&self, overrides: &PlanOverrides) -> Planner {
        let mut config = self.planner_config.clone();
        overrides.apply(&mut config);
        Planner::new(self.catalog.clone(), config)
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>stow-it-now API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the planning endpoints.
///
/// `containerTypes` may be omitted to plan with the built-in catalog.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(
    example = json!({
        "compartments": [
            { "id": 1, "maxWeight": 9000.0 },
            { "id": 2, "maxWeight": 9000.0 },
            { "id": 3, "maxWeight": 11000.0 },
            { "id": 4, "maxWeight": 11000.0 },
            { "id": 5, "maxWeight": 3500.0 }
        ],
        "shipments": [
            { "id": 1, "weight": 120.0, "width": 40.0, "height": 30.0, "length": 60.0 }
        ],
        "luggage": { "count": 250, "firstClassCount": 30, "avgWeight": 20.0 },
        "trials": 5000,
        "seed": 42
    })
)]
pub struct PlanRequest {
    pub compartments: Vec<CompartmentTarget>,
    #[serde(default)]
    pub container_types: Vec<ContainerTypeRecord>,
    pub shipments: Vec<ShipmentRecord>,
    #[serde(default)]
    pub luggage: LuggageSummary,
    #[serde(default)]
    #[schema(nullable = true)]
    pub trials: Option<usize>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub seed: Option<u64>,
}

/// Per-request adjustments of the allocator search.
#[derive(Debug, Default)]
struct PlanOverrides {
    trials: Option<usize>,
    seed: Option<u64>,
}

impl PlanOverrides {
    fn apply(&self, config: &mut PlannerConfig) {
        if let Some(trials) = self.trials {
            config.allocator.trials = trials;
        }
        if let Some(seed) = self.seed {
            config.allocator.seed = Some(seed);
        }
    }
}

#[derive(Debug)]
struct ValidatedPlanRequest {
    input: PlanInput,
    overrides: PlanOverrides,
}

#[derive(Debug)]
enum PlanRequestValidationError {
    MissingCompartments,
    ZeroTrials,
    InvalidShipment(ValidationError),
}

impl PlanRequest {
    fn into_validated(self) -> Result<ValidatedPlanRequest, PlanRequestValidationError> {
        if self.compartments.is_empty() {
            return Err(PlanRequestValidationError::MissingCompartments);
        }
        if self.trials == Some(0) {
            return Err(PlanRequestValidationError::ZeroTrials);
        }

        let shipments = self
            .shipments
            .into_iter()
            .map(ShipmentItem::try_from)
            .collect::<Result<Vec<_>, ValidationError>>()
            .map_err(PlanRequestValidationError::InvalidShipment)?;

        Ok(ValidatedPlanRequest {
            input: PlanInput {
                compartments: self.compartments,
                container_types: self.container_types,
                shipments,
                luggage: self.luggage,
            },
            overrides: PlanOverrides {
                trials: self.trials,
                seed: self.seed,
            },
        })
    }
}

/// Response structure of a finished plan.
///
/// # Fields
/// * `plan` - Submission payload, one entry per compartment
/// * `summary` - Weights per compartment and class, leftover containers
/// * `is_complete` - Whether every container found a compartment
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub plan: Vec<CompartmentPayload>,
    pub summary: PlanSummary,
    pub is_complete: bool,
}

impl PlanResponse {
    pub fn from_plan(plan: &Plan) -> Self {
        Self {
            plan: plan.payload(),
            summary: plan.summary(),
            is_complete: plan.unallocated.is_empty(),
        }
    }
}

/// Response of `/plan/remote`: the plan plus what the cargo service said about it.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlanResponse {
    #[serde(flatten)]
    pub result: PlanResponse,
    pub submitted: bool,
    #[schema(value_type = Option<Object>)]
    pub acknowledgement: Option<serde_json::Value>,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn plan_error(err: &PlanError) -> Response {
    warn!("⚠️ Planning failed: {err}");
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Planning failed",
        err.to_string(),
    )
}

fn remote_error(err: &RemoteError) -> Response {
    warn!("⚠️ Cargo service error: {err}");
    error_response(
        StatusCode::BAD_GATEWAY,
        "Cargo service unavailable",
        err.to_string(),
    )
}

fn worker_error(err: tokio::task::JoinError) -> Response {
    error!("❌ Planning worker crashed: {err}");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Planning worker failed",
        err.to_string(),
    )
}

fn parse_plan_request(
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> Result<ValidatedPlanRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated() {
        Ok(validated) => Ok(validated),
        Err(PlanRequestValidationError::MissingCompartments) => Err(validation_error(
            "At least one compartment must be specified",
        )),
        Err(PlanRequestValidationError::ZeroTrials) => {
            Err(validation_error("trials must be greater than 0"))
        }
        Err(PlanRequestValidationError::InvalidShipment(err)) => {
            Err(validation_error(err.to_string()))
        }
    }
}

/// Runs the CPU-bound planning off the async workers.
async fn run_planner(planner: Planner, input: PlanInput) -> Result<Plan, Response> {
    match tokio::task::spawn_blocking(move || planner.plan(input)).await {
        Ok(Ok(plan)) => Ok(plan),
        Ok(Err(err)) => Err(plan_error(&err)),
        Err(err) => Err(worker_error(err)),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_plan, handle_plan_stream, handle_plan_remote),
    components(
        schemas(
            PlanRequest,
            PlanResponse,
            RemotePlanResponse,
            PlanSummary,
            CompartmentSummary,
            ClassOutcome,
            UnallocatedContainer,
            CompartmentPayload,
            ShipmentContainerPayload,
            LuggageContainerPayload,
            CompartmentTarget,
            ContainerTypeRecord,
            ShipmentRecord,
            LuggageSummary,
            ErrorResponse
        )
    ),
    tags((name = "planning", description = "Endpoints for cargo load planning"))
)]
struct ApiDoc;

fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        // API endpoints
        .route("/plan", post(handle_plan))
        .route("/plan_stream", post(handle_plan_stream))
        .route("/plan/remote", post(handle_plan_remote))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server.
///
/// Configures CORS for cross-origin requests.
/// Blocks until the server is terminated.
pub async fn start_api_server(
    config: ApiConfig,
    remote_config: RemoteConfig,
    planner_config: PlannerConfig,
    catalog: Catalog,
) {
    let remote = match HttpCargoService::new(&remote_config) {
        Ok(remote) => remote,
        Err(err) => {
            error!("❌ {err}");
            return;
        }
    };
    let state = ApiState {
        catalog,
        planner_config,
        remote,
        submit_plan: remote_config.submit_plan(),
    };

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("❌ Could not bind API server to {}: {}", addr, err);
            return;
        }
    };

    info!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("✈️ API Endpoints:");
    info!("   - POST /plan");
    info!("   - POST /plan_stream");
    info!(
        "   - POST /plan/remote ({}, submit: {})",
        remote_config.base_url(),
        remote_config.submit_plan()
    );
    info!("📑 Documentation:");
    info!("   - GET /docs");
    info!("   - GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, router(state)).await {
        error!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /plan endpoint.
///
/// Packs the shipments, splits the luggage and allocates the containers
/// to the compartments.
///
/// # Parameters
/// * `payload` - JSON payload with compartments, shipments and luggage
///
/// # Returns
/// JSON response with the plan payload and its summary
#[utoipa::path(
    post,
    path = "/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Plan computed", body = PlanResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or no feasible plan",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_plan_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New plan request: {} shipments, {} compartments, {} bags",
        request.input.shipments.len(),
        request.input.compartments.len(),
        request.input.luggage.count
    );
    let planner = state.planner(&request.overrides);
    let plan = match run_planner(planner, request.input).await {
        Ok(plan) => plan,
        Err(response) => return response,
    };
    info!(
        "✈️ Result: {:.1} kg planned, {} containers unallocated",
        plan.total_weight(),
        plan.unallocated.len()
    );

    (StatusCode::OK, Json(PlanResponse::from_plan(&plan))).into_response()
}

/// Handler for POST /plan_stream endpoint (SSE).
///
/// Streams planning events in real-time as Server-Sent Events (text/event-stream).
/// A failed run ends the stream with an `Error` event.
#[utoipa::path(
    post,
    path = "/plan_stream",
    request_body = PlanRequest,
    responses(
        (
            status = 200,
            description = "Streams planning events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_plan_request(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let planner = state.planner(&request.overrides);
    let input = request.input;
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let result = planner.plan_with_progress(input, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver only means nobody is listening anymore.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = result {
            warn!("⚠️ Streamed planning failed: {err}");
            let event = json!({ "type": "Error", "message": err.to_string() });
            let _ = tx.blocking_send(event.to_string());
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /plan/remote endpoint.
///
/// Fetches the flight data from the cargo service, plans it and submits the
/// plan when submission is enabled.
#[utoipa::path(
    post,
    path = "/plan/remote",
    responses(
        (status = 200, description = "Plan computed from the cargo service data", body = RemotePlanResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "No feasible plan for the reported data",
            body = ErrorResponse
        ),
        (
            status = BAD_GATEWAY,
            description = "The cargo service failed or rejected the plan",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_plan_remote(State(state): State<ApiState>) -> impl IntoResponse {
    let input = match remote::fetch_inputs(&state.remote).await {
        Ok(input) => input,
        Err(err) => return remote_error(&err),
    };

    let planner = state.planner(&PlanOverrides::default());
    let plan = match run_planner(planner, input).await {
        Ok(plan) => plan,
        Err(response) => return response,
    };
    let result = PlanResponse::from_plan(&plan);

    let acknowledgement = if state.submit_plan {
        match state.remote.submit_plan(&result.plan).await {
            Ok(ack) => Some(ack),
            Err(err) => return remote_error(&err),
        }
    } else {
        None
    };

    let response = RemotePlanResponse {
        result,
        submitted: acknowledgement.is_some(),
        acknowledgement,
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::AllocatorConfig;
    use std::time::Duration;

    fn test_state() -> ApiState {
        ApiState {
            catalog: Catalog::default_fleet(),
            planner_config: PlannerConfig {
                allocator: AllocatorConfig {
                    trials: 100,
                    seed: Some(5),
                    time_budget: None,
                },
                ..PlannerConfig::default()
            },
            remote: HttpCargoService::with_timeout("http://127.0.0.1:9", Duration::from_secs(1))
                .expect("client builds"),
            submit_plan: false,
        }
    }

    fn request_json() -> &'static str {
        r#"{
            "compartments": [
                {"id": 1, "maxWeight": 9000.0},
                {"compartmentId": 2, "maxWeight": 9000.0},
                {"id": 3, "maxWeight": 11000.0},
                {"id": 4, "maxWeight": 11000.0},
                {"id": 5, "maxWeight": 3500.0}
            ],
            "shipments": [
                {"awb": 1, "weight": 120.0, "width": 40.0, "height": 30.0, "length": 60.0},
                {"id": 2, "weight": 80.0, "width": 20.0, "height": 20.0, "length": 20.0}
            ],
            "luggage": {"nbOfLuggage": 90, "averageWeight": 19.5}
        }"#
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in ["/plan", "/plan_stream", "/plan/remote"] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["PlanRequest", "PlanResponse", "CompartmentPayload", "ErrorResponse"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn plan_request_accepts_service_field_names() {
        let request: PlanRequest =
            serde_json::from_str(request_json()).expect("Should parse valid JSON");
        assert_eq!(request.compartments[1].id, 2);
        assert_eq!(request.shipments[0].id, 1);
        assert_eq!(request.luggage.count, 90);
        assert!(request.container_types.is_empty());
        assert_eq!(request.trials, None);
    }

    #[test]
    fn invalid_shipment_is_rejected_during_validation() {
        let mut request: PlanRequest = serde_json::from_str(request_json()).unwrap();
        request.shipments[0].width = 0.0;
        assert!(matches!(
            request.into_validated(),
            Err(PlanRequestValidationError::InvalidShipment(_))
        ));
    }

    #[test]
    fn missing_compartments_and_zero_trials_are_rejected() {
        let mut request: PlanRequest = serde_json::from_str(request_json()).unwrap();
        request.compartments.clear();
        assert!(matches!(
            request.into_validated(),
            Err(PlanRequestValidationError::MissingCompartments)
        ));

        let mut request: PlanRequest = serde_json::from_str(request_json()).unwrap();
        request.trials = Some(0);
        assert!(matches!(
            request.into_validated(),
            Err(PlanRequestValidationError::ZeroTrials)
        ));
    }

    #[test]
    fn request_overrides_replace_allocator_settings() {
        let mut config = PlannerConfig::default();
        PlanOverrides {
            trials: Some(12),
            seed: Some(99),
        }
        .apply(&mut config);
        assert_eq!(config.allocator.trials, 12);
        assert_eq!(config.allocator.seed, Some(99));

        let mut config = PlannerConfig::default();
        PlanOverrides::default().apply(&mut config);
        assert_eq!(config, PlannerConfig::default());
    }

    #[tokio::test]
    async fn plan_endpoint_returns_payload_for_every_compartment() {
        let request: PlanRequest = serde_json::from_str(request_json()).unwrap();
        let response = handle_plan(State(test_state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn plan_endpoint_reports_planning_errors() {
        let mut request: PlanRequest = serde_json::from_str(request_json()).unwrap();
        // compartment 4 belongs to the aft class
        request.compartments.retain(|target| target.id != 4);
        let response = handle_plan(State(test_state()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn plan_response_marks_incomplete_plans() {
        let state = test_state();
        let request: PlanRequest = serde_json::from_str(request_json()).unwrap();
        let validated = request.into_validated().unwrap();
        let plan = state
            .planner(&validated.overrides)
            .plan(validated.input)
            .unwrap();
        let response = PlanResponse::from_plan(&plan);
        assert_eq!(response.plan.len(), 5);
        assert_eq!(response.is_complete, plan.unallocated.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("isComplete").is_some());
        assert!(json["summary"].get("totalWeight").is_some());
    }
}
