//! HTTP surface: routing, shared state, and graceful shutdown.

pub mod errors;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, warn};

use crate::knowledge_base::RetrieveGenerate;
use crate::query::{QueryOrchestrator, QueryRequest, QueryResult};
use errors::ApiError;

pub struct AppState<C> {
    pub orchestrator: Arc<QueryOrchestrator<C>>,
}

// Clone only the Arc; `C` itself need not be Clone.
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

pub fn router<C>(orchestrator: Arc<QueryOrchestrator<C>>) -> Router
where
    C: RetrieveGenerate + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/query_knowledge_base", post(query_knowledge_base::<C>))
        .with_state(AppState { orchestrator })
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Binds `addr` and serves until Ctrl+C.
pub async fn serve<C>(addr: SocketAddr, orchestrator: QueryOrchestrator<C>) -> std::io::Result<()>
where
    C: RetrieveGenerate + Send + Sync + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router(Arc::new(orchestrator)))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Handler: POST /query_knowledge_base
///
/// ```bash
/// curl -X POST http://127.0.0.1:5005/query_knowledge_base \
///   -H 'content-type: application/json' \
///   -d '{"query":"What is the minimum ceiling height?","max_results":2}'
/// ```
pub async fn query_knowledge_base<C>(
    State(state): State<AppState<C>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, ApiError>
where
    C: RetrieveGenerate + Send + Sync + 'static,
{
    let Json(request) = payload?;
    let result = state.orchestrator.handle_query(request).await?;
    Ok(Json(result))
}
