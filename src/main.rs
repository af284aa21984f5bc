//! Aura Grow backend
//!
//! LAN monitoring backend for a fleet of ESP8266-class farm sensors.
//! Polls every configured device on a fixed schedule, aggregates the
//! readings into a fleet snapshot, and serves both the data and the
//! fleet configuration over a JSON REST API.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod aggregate;
mod config;
mod device;
mod error;
mod handlers;
mod history;
mod models;
mod poller;
mod scheduler;
mod state;
mod validation;

use crate::config::Settings;
use crate::device::DeviceClient;
use crate::scheduler::Scheduler;
use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,auragrow=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);

    info!("Starting Aura Grow backend");
    info!("Binding server to {}", bind_address);

    // Shared application state
    let app_state = Arc::new(RwLock::new(AppState::new(settings.poll_config())));

    // ---------------------------------------------------------------------
    // Device polling scheduler
    // ---------------------------------------------------------------------
    let client = DeviceClient::new(settings.status_timeout(), settings.detail_timeout())
        .context("Failed to build device HTTP client")?;

    let scheduler = Scheduler::spawn(
        app_state.clone(),
        client,
        settings.poll.history_window,
    )
    .await;

    // ---------------------------------------------------------------------
    // HTTP server
    // ---------------------------------------------------------------------
    let server_state = app_state.clone();
    let server_scheduler = scheduler.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .app_data(web::Data::new(server_scheduler.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await?;

    // Server loop ended (signal received); stop polling cleanly.
    let _ = scheduler.stop();

    Ok(())
}
