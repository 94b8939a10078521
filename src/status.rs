use crate::error::FetchError;
use crate::models::*;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status/v1/overview", get(default_overview))
        .route("/status/v1/servers", get(servers_overview))
        .route("/status/v1/servers/{name}", get(server_overview))
        .route("/status/v1/lookup", get(lookup))
        .route("/status/v1/health", get(health))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn default_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ServerOverview>, FetchError> {
    let (cancel, _guard) = state.request_token();
    match state.service.overview(&cancel).await {
        Ok(overview) => Ok(Json(overview)),
        Err(e) => {
            tracing::warn!("Error fetching default overview: {}", e);
            Err(e)
        }
    }
}

pub async fn servers_overview(State(state): State<Arc<AppState>>) -> Json<ServersOverview> {
    let (cancel, _guard) = state.request_token();
    Json(state.service.aggregate(&cancel).await)
}

pub async fn server_overview(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ServerOverview>, FetchError> {
    let (cancel, _guard) = state.request_token();
    match state.service.overview_by_name(&name, &cancel).await {
        Ok(overview) => Ok(Json(overview)),
        Err(e) => {
            tracing::warn!("Error fetching overview for {}: {}", name, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
}

pub async fn lookup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Result<Json<ServerOverview>, FetchError> {
    let (cancel, _guard) = state.request_token();
    match state
        .service
        .overview_by_address(&params.host, &params.port, &cancel)
        .await
    {
        Ok(overview) => Ok(Json(overview)),
        Err(e) => {
            tracing::warn!("Error fetching overview for {}:{}: {}", params.host, params.port, e);
            Err(e)
        }
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        configured_servers: state.service.server_count(),
    })
}
