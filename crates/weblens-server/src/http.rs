//! HTTP surface: `POST /summarize`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::agent::Agent;

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub text: String,
    /// Page the text came from, passed to the model as context.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    detail: String,
}

fn detail(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ErrorDetail { detail: msg.into() })).into_response()
}

async fn summarize(State(agent): State<Arc<Agent>>, Json(req): Json<SummarizeRequest>) -> Response {
    if req.text.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, "Text is empty");
    }
    let url = req.url.as_deref();
    match agent.summarize(&req.text, url).await {
        Ok(summary) => Json(SummarizeResponse { summary }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "summarize failed");
            detail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error summarizing: {e}"),
            )
        }
    }
}

/// Router with CORS open to any origin (the browser extension posts from page origins).
pub fn router(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/summarize", post(summarize))
        .with_state(agent)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// Serve until SIGINT/SIGTERM; in-flight requests are allowed to finish.
pub async fn serve(bind: SocketAddr, agent: Arc<Agent>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(agent))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
