//! Main HTTP Gateway Server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use runrelay_core::AssistantGateway;
use runrelay_resolver::RunResolver;

use crate::detect_intent;
use crate::health;
use crate::session_store::SessionStore;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub resolver: Arc<RunResolver>,
    pub gateway: Arc<dyn AssistantGateway>,
    pub sessions: SessionStore,
    pub assistant_id: Arc<str>,
    pub request_timeout: Duration,
}

impl GatewayState {
    pub fn new(
        resolver: Arc<RunResolver>,
        gateway: Arc<dyn AssistantGateway>,
        sessions: SessionStore,
        assistant_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            resolver,
            gateway,
            sessions,
            assistant_id: assistant_id.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// CORS policy: every origin, the common methods and browser headers.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::ACCEPT_LANGUAGE,
            header::CONTENT_LANGUAGE,
            header::ORIGIN,
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
        ])
}

/// Build the router with all gateway routes.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/detectIntent", post(detect_intent::detect_intent))
        .route("/health", get(health::get_health))
        .route("/functions", get(health::list_functions))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

/// Starts the HTTP server and serves until the process ends.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let app = build_router(state);

    info!("Gateway HTTP server listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
