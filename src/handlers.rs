//! HTTP request handlers
//!
//! Implements the REST API consumed by the dashboard: read access to the
//! latest fleet state and the configuration surface that feeds the
//! scheduler. All configuration mutations route through the
//! [`Scheduler`] handle so an in-flight poll cycle is never torn.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use validator::Validate;

use crate::aggregate;
use crate::config::PollConfig;
use crate::error::AppError;
use crate::models::{HealthCheck, HistoryStats, Sensor};
use crate::poller::PollEvent;
use crate::scheduler::Scheduler;
use crate::state::AppState;
use crate::validation::validate_request;

/// Configure all application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // Health check
            .route("/health", web::get().to(health_check))
            // Fleet read surface
            .route("/sensors", web::get().to(get_sensors))
            .route("/snapshot", web::get().to(get_snapshot))
            .route("/conditions", web::get().to(get_conditions))
            .route("/events", web::get().to(get_events))
            // Configuration surface
            .route("/config", web::get().to(get_config))
            .route("/devices", web::post().to(add_device))
            .route("/devices/{address}", web::delete().to(remove_device))
            .route("/poll/interval", web::put().to(set_interval))
            .route("/refresh", web::post().to(trigger_refresh)),
    );
}

/// Health check endpoint
///
/// GET /api/health
pub async fn health_check(
    state: web::Data<Arc<RwLock<AppState>>>,
) -> Result<HttpResponse, AppError> {
    let state = state.read().await;

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        cycles_completed: state.cycles_completed(),
        last_cycle: state.last_cycle(),
    };

    Ok(HttpResponse::Ok().json(health))
}

/// Per-device sensor record plus window statistics for detail views.
#[derive(Serialize)]
struct SensorView {
    #[serde(flatten)]
    sensor: Sensor,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<HistoryStats>,
}

/// List the latest Sensor records, one per configured device.
///
/// GET /api/sensors
pub async fn get_sensors(
    state: web::Data<Arc<RwLock<AppState>>>,
) -> Result<HttpResponse, AppError> {
    let state = state.read().await;

    let sensors: Vec<SensorView> = state
        .sensors()
        .map(|sensor| SensorView {
            stats: aggregate::history_stats(sensor),
            sensor: sensor.clone(),
        })
        .collect();

    Ok(HttpResponse::Ok().json(sensors))
}

/// Get the latest published fleet aggregate.
///
/// GET /api/snapshot
pub async fn get_snapshot(
    state: web::Data<Arc<RwLock<AppState>>>,
) -> Result<HttpResponse, AppError> {
    let state = state.read().await;

    match state.snapshot() {
        Some(snapshot) => Ok(HttpResponse::Ok().json(snapshot)),
        None => Err(AppError::NotFound(
            "No poll cycle has completed yet".to_string(),
        )),
    }
}

/// Averaged field conditions for the crop-recommendation engine.
///
/// GET /api/conditions
pub async fn get_conditions(
    state: web::Data<Arc<RwLock<AppState>>>,
) -> Result<HttpResponse, AppError> {
    let state = state.read().await;
    Ok(HttpResponse::Ok().json(state.field_conditions()))
}

/// Query parameters for the event log
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// Recent poll attempts, newest first.
///
/// GET /api/events?limit=20
pub async fn get_events(
    state: web::Data<Arc<RwLock<AppState>>>,
    query: web::Query<EventsQuery>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(usize::MAX);
    let state = state.read().await;

    let events: Vec<&PollEvent> = state.events().take(limit).collect();
    Ok(HttpResponse::Ok().json(events))
}

/// Current device list and polling interval.
///
/// GET /api/config
pub async fn get_config(
    state: web::Data<Arc<RwLock<AppState>>>,
) -> Result<HttpResponse, AppError> {
    let state = state.read().await;
    Ok(HttpResponse::Ok().json(state.config()))
}

/// Input DTO for adding a device
#[derive(Debug, Deserialize, Validate)]
pub struct AddDeviceRequest {
    #[validate(length(min = 1, max = 253, message = "Address must be 1-253 characters"))]
    pub address: String,
}

#[derive(Serialize)]
struct ConfigChangeResponse {
    success: bool,
    config: PollConfig,
}

/// Add a device address to the fleet.
///
/// POST /api/devices
pub async fn add_device(
    state: web::Data<Arc<RwLock<AppState>>>,
    scheduler: web::Data<Scheduler>,
    body: web::Json<AddDeviceRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*body)?;

    let address = scheduler.add_device(&body.address).await?;
    info!(%address, "Device added");

    let config = state.read().await.config().clone();
    Ok(HttpResponse::Created().json(ConfigChangeResponse {
        success: true,
        config,
    }))
}

/// Remove a device address from the fleet.
///
/// DELETE /api/devices/{address}
pub async fn remove_device(
    state: web::Data<Arc<RwLock<AppState>>>,
    scheduler: web::Data<Scheduler>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let address = path.into_inner();

    scheduler.remove_device(&address).await?;
    info!(%address, "Device removed");

    let config = state.read().await.config().clone();
    Ok(HttpResponse::Ok().json(ConfigChangeResponse {
        success: true,
        config,
    }))
}

/// Input DTO for changing the polling interval
#[derive(Debug, Deserialize, Validate)]
pub struct SetIntervalRequest {
    #[validate(range(min = 1, message = "Interval must be a positive number of milliseconds"))]
    pub interval_ms: u64,
}

/// Change the polling interval.
///
/// PUT /api/poll/interval
pub async fn set_interval(
    state: web::Data<Arc<RwLock<AppState>>>,
    scheduler: web::Data<Scheduler>,
    body: web::Json<SetIntervalRequest>,
) -> Result<HttpResponse, AppError> {
    validate_request(&*body)?;

    scheduler.set_interval(body.interval_ms).await?;
    info!(interval_ms = body.interval_ms, "Polling interval changed");

    let config = state.read().await.config().clone();
    Ok(HttpResponse::Ok().json(ConfigChangeResponse {
        success: true,
        config,
    }))
}

/// Trigger an immediate poll cycle.
///
/// POST /api/refresh
pub async fn trigger_refresh(
    scheduler: web::Data<Scheduler>,
) -> Result<HttpResponse, AppError> {
    scheduler.refresh()?;
    Ok(HttpResponse::Accepted().json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use std::time::Duration;
    use tokio::time::sleep;

    use crate::device::DeviceClient;

    async fn test_app_state(
        addresses: Vec<String>,
    ) -> (Arc<RwLock<AppState>>, Scheduler) {
        let state = Arc::new(RwLock::new(AppState::new(PollConfig {
            addresses,
            interval_ms: 60_000,
        })));
        let client =
            DeviceClient::new(Duration::from_millis(500), Duration::from_millis(500)).unwrap();
        let scheduler = Scheduler::spawn(state.clone(), client, 24).await;
        (state, scheduler)
    }

    async fn wait_for_first_cycle(state: &Arc<RwLock<AppState>>) {
        for _ in 0..200 {
            if state.read().await.snapshot().is_some() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("Timeout waiting for first poll cycle");
    }

    macro_rules! init_app {
        ($state:expr, $scheduler:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state.clone()))
                    .app_data(web::Data::new($scheduler.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_health_check() {
        let (state, scheduler) = test_app_state(vec![]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_snapshot_published_after_first_cycle() {
        let (state, scheduler) = test_app_state(vec![]).await;
        wait_for_first_cycle(&state).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::get().uri("/api/snapshot").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["total_count"], 0);
        assert_eq!(body["connected_count"], 0);
    }

    #[actix_web::test]
    async fn test_conditions_report_no_data() {
        let (state, scheduler) = test_app_state(vec![]).await;
        wait_for_first_cycle(&state).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::get().uri("/api/conditions").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["soil_moisture"].is_null());
        assert!(body["rainfall_equivalent"].is_null());
    }

    #[actix_web::test]
    async fn test_add_and_remove_device() {
        let (state, scheduler) = test_app_state(vec![]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::post()
            .uri("/api/devices")
            .set_json(serde_json::json!({ "address": "10.0.0.5" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        assert_eq!(
            state.read().await.config().addresses,
            vec!["10.0.0.5".to_string()]
        );

        let req = test::TestRequest::delete()
            .uri("/api/devices/10.0.0.5")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        assert!(state.read().await.config().addresses.is_empty());
    }

    #[actix_web::test]
    async fn test_add_invalid_device_rejected() {
        let (state, scheduler) = test_app_state(vec![]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::post()
            .uri("/api/devices")
            .set_json(serde_json::json!({ "address": "not a host name" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        assert!(state.read().await.config().addresses.is_empty());
    }

    #[actix_web::test]
    async fn test_duplicate_device_rejected() {
        let (state, scheduler) = test_app_state(vec!["10.0.0.5".to_string()]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::post()
            .uri("/api/devices")
            .set_json(serde_json::json!({ "address": "10.0.0.5" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_remove_unknown_device() {
        let (state, scheduler) = test_app_state(vec![]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::delete()
            .uri("/api/devices/10.9.9.9")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn test_set_interval() {
        let (state, scheduler) = test_app_state(vec![]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::put()
            .uri("/api/poll/interval")
            .set_json(serde_json::json!({ "interval_ms": 1000 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        assert_eq!(state.read().await.config().interval_ms, 1000);

        let req = test::TestRequest::put()
            .uri("/api/poll/interval")
            .set_json(serde_json::json!({ "interval_ms": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn test_refresh_accepted() {
        let (state, scheduler) = test_app_state(vec![]).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::post().uri("/api/refresh").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 202);
    }

    #[actix_web::test]
    async fn test_sensors_and_events_endpoints() {
        // An unreachable device still shows up in the sensor list and
        // leaves a trace in the event log.
        let (state, scheduler) = test_app_state(vec!["127.0.0.1:1".to_string()]).await;
        wait_for_first_cycle(&state).await;
        let app = init_app!(state, scheduler);

        let req = test::TestRequest::get().uri("/api/sensors").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["connection_status"], "disconnected");

        let req = test::TestRequest::get()
            .uri("/api/events?limit=5")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body[0]["outcome"], "unreachable");
    }
}
