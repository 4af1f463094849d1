//! Health and introspection endpoints.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use runrelay_core::FunctionDefinition;

use crate::server::GatewayState;

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub sessions: u64,
    pub functions: usize,
    pub timestamp: DateTime<Utc>,
}

/// Handler for `GET /health`
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        service: "runrelay",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions.len().await,
        functions: state.resolver.registry().len(),
        timestamp: Utc::now(),
    })
}

/// Handler for `GET /functions`
pub async fn list_functions(State(state): State<GatewayState>) -> Json<Vec<FunctionDefinition>> {
    Json(state.resolver.registry().definitions())
}
