use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::settlement::scheduler::{SchedulerMonitor, SchedulerStatus};

pub fn create_app(monitor: SchedulerMonitor) -> Router {
    info!("⚙️ Setting up status routes...");

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(scheduler_status))
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(monitor)
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Status server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn scheduler_status(State(monitor): State<SchedulerMonitor>) -> Json<SchedulerStatus> {
    Json(monitor.status())
}
