//! HTTP API for health checks, Prometheus metrics and account management

use agent_lib::{
    accounts::{Account, AccountRegistry, NewAccount},
    collector::series_names,
    error::{AccountError, StoreError},
    health::{components, ComponentStatus, HealthRegistry},
    inventory::InventoryCache,
    observability::StructuredLogger,
    store::{Sample, SeriesEntity, SeriesKind, TimeSeriesStore},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
    pub accounts: AccountRegistry,
    pub inventory: InventoryCache,
    pub store: Arc<TimeSeriesStore>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        logger: StructuredLogger,
        accounts: AccountRegistry,
        inventory: InventoryCache,
        store: Arc<TimeSeriesStore>,
    ) -> Self {
        Self {
            health_registry,
            logger,
            accounts,
            inventory,
            store,
        }
    }
}

/// JSON error body with the status it maps to
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        let status = match e {
            AccountError::AlreadyExists(_) => StatusCode::CONFLICT,
            AccountError::NotFound(_) => StatusCode::NOT_FOUND,
            AccountError::Invalid(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match e {
            StoreError::UnrecognizedField { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

/// Health check response - 200 while operational, 503 when unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn add_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let account = state.accounts.add_account(request).await?;
    state
        .logger
        .log_account_registered(&account.name, &account.collector);
    Ok((StatusCode::CREATED, Json(account)))
}

async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<Account>> {
    Json(state.accounts.list().await)
}

#[derive(Debug, Deserialize)]
pub struct DeviceClasses {
    #[serde(default)]
    pub linux_device_class: Option<String>,
    #[serde(default)]
    pub windows_device_class: Option<String>,
}

async fn set_device_classes(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(classes): Json<DeviceClasses>,
) -> Result<Json<Account>, ApiError> {
    let account = state
        .accounts
        .set_device_classes(&name, classes.linux_device_class, classes.windows_device_class)
        .await?;
    info!(account = %name, "Device classes updated");
    Ok(Json(account))
}

async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.accounts.get(&name).await.is_none() {
        return Err(ApiError::not_found(format!("account {} not found", name)));
    }
    state
        .inventory
        .get(&name)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no inventory discovered yet for {}", name)))
}

#[derive(Debug, Deserialize)]
pub struct SeriesRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub entity: SeriesEntity,
    pub field: String,
    pub start: i64,
    pub end: i64,
    pub samples: Vec<Sample>,
}

async fn query_series(
    State(state): State<Arc<AppState>>,
    Path((kind, entity, field)): Path<(String, String, String)>,
    Query(range): Query<SeriesRange>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let kind = SeriesKind::parse(&kind)
        .ok_or_else(|| ApiError::bad_request(format!("unknown series kind {}", kind)))?;
    if !series_names().any(|name| name == field) {
        return Err(ApiError::bad_request(format!(
            "field {} is not a recognized series field",
            field
        )));
    }

    let end = range.end.unwrap_or_else(|| Utc::now().timestamp());
    let start = range
        .start
        .unwrap_or_else(|| end - state.store.policy().window_secs());
    if start > end {
        return Err(ApiError::bad_request("start must not be after end"));
    }

    let entity = SeriesEntity::parse(kind, &entity);
    let samples = state.store.query(&entity, &field, start, end)?;

    Ok(Json(SeriesResponse {
        entity,
        field,
        start,
        end,
        samples,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/accounts", get(list_accounts).post(add_account))
        .route(
            "/api/v1/accounts/:name/device-classes",
            put(set_device_classes),
        )
        .route("/api/v1/accounts/:name/inventory", get(get_inventory))
        .route("/api/v1/series/:kind/:entity/:field", get(query_series))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let health = state.health_registry.clone();
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Failed to bind API server");
            health
                .set_unhealthy(components::API, format!("bind {}: {}", addr, e))
                .await;
            return Err(e.into());
        }
    };
    health.set_healthy(components::API).await;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_lib::health::DiscoveryOutcome;
    use agent_lib::models::{DiscoveryReport, EntityId, InventoryGraph};
    use agent_lib::inventory::InventorySink;
    use agent_lib::store::RetentionPolicy;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn setup_test_app() -> (Router, Arc<AppState>) {
        let health_registry = HealthRegistry::new();
        health_registry.register_all().await;

        let store = TimeSeriesStore::new(series_names(), RetentionPolicy::default());
        let state = Arc::new(AppState::new(
            health_registry,
            StructuredLogger::new("test-collector"),
            AccountRegistry::new(),
            InventoryCache::new(),
            Arc::new(store),
        ));

        (create_router(state.clone()), state)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_account(name: &str) -> Request<Body> {
        let body = serde_json::json!({
            "name": name,
            "access_key": "AKIDEXAMPLE",
            "secret_key": "secret",
        });
        Request::builder()
            .method("POST")
            .uri("/api/v1/accounts")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_all_healthy() {
        let (app, state) = setup_test_app().await;
        for name in components::ALL {
            state.health_registry.set_healthy(name).await;
        }

        let (status, json) = send(app, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_healthz_reports_failed_regions() {
        let (app, state) = setup_test_app().await;
        state
            .health_registry
            .record_discovery("prod", DiscoveryOutcome::RegionsFailed(1))
            .await;

        let (status, json) = send(app, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(
            json["components"]["discovery"]["message"],
            "prod: 1 region failed"
        );
    }

    #[tokio::test]
    async fn test_healthz_unhealthy() {
        let (app, state) = setup_test_app().await;
        state
            .health_registry
            .set_unhealthy(components::STORE, "disk full")
            .await;

        let (status, _) = send(app, get("/healthz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_not_ready() {
        let (app, _) = setup_test_app().await;
        let (status, json) = send(app, get("/readyz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["ready"], false);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = setup_test_app().await;
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint_reports_registered_accounts() {
        let (app, _) = setup_test_app().await;
        send(app.clone(), post_account("prod")).await;

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("ec2_agent_accounts_registered"));
    }

    #[tokio::test]
    async fn test_add_account_created() {
        let (app, state) = setup_test_app().await;

        let (status, json) = send(app, post_account("prod")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "prod");
        assert_eq!(json["collector"], "localhost");
        assert!(json.get("secret_key").is_none());
        assert_eq!(state.accounts.len().await, 1);
    }

    #[tokio::test]
    async fn test_add_duplicate_account_conflict() {
        let (app, _) = setup_test_app().await;

        let (status, _) = send(app.clone(), post_account("prod")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = send(app, post_account("prod")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "A device named prod already exists.");
    }

    #[tokio::test]
    async fn test_add_account_blank_name() {
        let (app, _) = setup_test_app().await;
        let (status, _) = send(app, post_account(" ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_accounts() {
        let (app, _) = setup_test_app().await;
        send(app.clone(), post_account("staging")).await;
        send(app.clone(), post_account("dev")).await;

        let (status, json) = send(app, get("/api/v1/accounts")).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["dev", "staging"]);
    }

    #[tokio::test]
    async fn test_set_device_classes() {
        let (app, _) = setup_test_app().await;
        send(app.clone(), post_account("prod")).await;

        let request = Request::builder()
            .method("PUT")
            .uri("/api/v1/accounts/prod/device-classes")
            .header("content-type", "application/json")
            .body(Body::from(
                r#"{"linux_device_class": "/Server/Linux", "windows_device_class": ""}"#,
            ))
            .unwrap();
        let (status, json) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["linux_device_class"], "/Server/Linux");
        assert!(json["windows_device_class"].is_null());
    }

    #[tokio::test]
    async fn test_set_device_classes_unknown_account() {
        let (app, _) = setup_test_app().await;
        let request = Request::builder()
            .method("PUT")
            .uri("/api/v1/accounts/missing/device-classes")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_inventory_not_yet_discovered() {
        let (app, _) = setup_test_app().await;
        send(app.clone(), post_account("prod")).await;

        let (status, _) = send(app, get("/api/v1/accounts/prod/inventory")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_inventory_after_discovery() {
        let (app, state) = setup_test_app().await;
        send(app.clone(), post_account("prod")).await;

        let report = DiscoveryReport {
            account: "prod".to_string(),
            graph: InventoryGraph::new(),
            failed_regions: Vec::new(),
            discover_guests: true,
            discovered_at: Utc::now(),
        };
        state.inventory.apply(&report).await.unwrap();

        let (status, json) = send(app, get("/api/v1/accounts/prod/inventory")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["account"], "prod");
        assert_eq!(json["discover_guests"], true);
    }

    #[tokio::test]
    async fn test_query_series() {
        let (app, state) = setup_test_app().await;
        let entity =
            SeriesEntity::instance(&EntityId::normalize("us-east-1"), &EntityId::normalize("i-1"));
        state
            .store
            .append(&entity, "CPUUtilization", 1_704_067_200, 40.0)
            .unwrap();

        let (status, json) = send(
            app,
            get("/api/v1/series/instance/us-east-1.i-1/CPUUtilization?start=1704066000&end=1704067800"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["field"], "CPUUtilization");
        assert_eq!(json["entity"]["id"], "us_east_1.i_1");
        assert_eq!(json["samples"].as_array().unwrap().len(), 1);
        assert_eq!(json["samples"][0]["value"], 40.0);
    }

    #[tokio::test]
    async fn test_query_series_keeps_regions_apart() {
        let (app, state) = setup_test_app().await;
        let west =
            SeriesEntity::instance(&EntityId::normalize("us-west-2"), &EntityId::normalize("I-1"));
        state
            .store
            .append(&west, "CPUUtilization", 1_704_067_200, 7.0)
            .unwrap();

        let range = "CPUUtilization?start=1704066000&end=1704067800";
        let (status, json) = send(
            app.clone(),
            get(&format!("/api/v1/series/instance/us-west-2.i-1/{}", range)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["samples"][0]["value"], 7.0);

        let (status, json) = send(
            app,
            get(&format!("/api/v1/series/instance/us-east-1.i-1/{}", range)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["samples"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_series_never_written_is_empty() {
        let (app, _) = setup_test_app().await;
        let (status, json) = send(
            app,
            get("/api/v1/series/account/prod/NetworkIn?start=0&end=600"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["samples"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_series_unknown_kind_or_field() {
        let (app, _) = setup_test_app().await;

        let (status, _) = send(app.clone(), get("/api/v1/series/host/i-1/CPUUtilization")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(app, get("/api/v1/series/instance/us-east-1.i-1/MemoryUsed")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("MemoryUsed"));
    }
}
