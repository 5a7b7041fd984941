//! HTTP API: axum router over the query service, refresher and analysis pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::analysis::{AnalysisOrchestrator, AnalysisPayload, AnalysisReport};
use crate::cache::refresher::CacheRefresher;
use crate::cache::CacheStatus;
use crate::error::{ApiError, ApiResult};
use crate::query::{DefenseReport, MatchupReport, PlayerReport, QueryService};

/// Shared state accessible by all route handlers.
#[derive(Clone)]
pub struct ApiState {
    query: Arc<QueryService>,
    refresher: Arc<CacheRefresher>,
    analysis: Arc<AnalysisOrchestrator>,
}

impl ApiState {
    pub fn new(refresher: Arc<CacheRefresher>, analysis: AnalysisOrchestrator) -> Self {
        Self {
            query: Arc::new(QueryService::new(Arc::clone(&refresher))),
            refresher,
            analysis: Arc::new(analysis),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/player/{name}", get(player_handler))
        .route("/api/defense/{team}", get(defense_handler))
        .route("/api/matchup/{player}/{team}", get(matchup_handler))
        .route("/api/ai-analysis", post(analysis_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(state: ApiState, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on {addr}"))?;
    info!(addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// -- Route Handlers --

async fn player_handler(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<PlayerReport>> {
    state.query.query_player(&name).await.map(Json)
}

async fn defense_handler(
    State(state): State<ApiState>,
    Path(team): Path<String>,
) -> ApiResult<Json<DefenseReport>> {
    state.query.query_team(&team).await.map(Json)
}

async fn matchup_handler(
    State(state): State<ApiState>,
    Path((player, team)): Path<(String, String)>,
) -> ApiResult<Json<MatchupReport>> {
    state.query.query_matchup(&player, &team).await.map(Json)
}

async fn analysis_handler(
    State(state): State<ApiState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> ApiResult<Json<AnalysisReport>> {
    let Json(payload) =
        payload.map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?;
    let request = payload.validate()?;
    state.analysis.run(request).await.map(Json)
}

async fn refresh_handler(State(state): State<ApiState>) -> impl IntoResponse {
    // Detached; progress is visible through /api/status.
    drop(state.refresher.spawn_refresh());
    info!("Manual cache refresh started");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "Cache refresh started" })),
    )
}

async fn status_handler(State(state): State<ApiState>) -> Json<CacheStatus> {
    Json(state.refresher.cache().status().await)
}
