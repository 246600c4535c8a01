//! HTTP edge: accepts source webhook deliveries and always acknowledges them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use taskbridge_core::client::TaskApiConnector;
use taskbridge_core::credential::TokenExchange;
use taskbridge_core::store::KvStore;
use taskbridge_core::WebhookHandler;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Receives raw webhook bodies. Implementations must never fail the request.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, body: &[u8]);
}

impl<S, X, C> EventSink for WebhookHandler<S, X, C>
where
    S: KvStore + ?Sized + 'static,
    X: TokenExchange + 'static,
    C: TaskApiConnector + 'static,
{
    fn deliver(&self, body: &[u8]) {
        if let Some(outcome) = self.acknowledge(body) {
            debug!(%outcome, "webhook acknowledged");
        }
    }
}

type SharedSink = Arc<dyn EventSink>;

pub fn router(sink: SharedSink) -> Router {
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/todoist-webhook/", post(webhook).fallback(not_found))
        .route("/todoist-webhook/*rest", post(webhook).fallback(not_found))
        .fallback(not_found)
        .with_state(sink)
}

async fn health() -> impl IntoResponse {
    axum::Json(json!({ "status": "ok" }))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        "Not found",
    )
        .into_response()
}

async fn webhook(State(sink): State<SharedSink>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if content_type != Some("application/json") {
        return not_found().await;
    }

    // One request is one sequential unit of work; the pipeline blocks on I/O.
    if let Err(err) = tokio::task::spawn_blocking(move || sink.deliver(&body)).await {
        error!(error = %err, "webhook worker panicked");
    }
    StatusCode::OK.into_response()
}

/// Periodically drop expired store rows.
pub async fn sweep_expired<S: KvStore + ?Sized + 'static>(store: Arc<S>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || store.purge_expired()).await {
            Ok(Ok(removed)) => debug!(removed, "expiry sweep finished"),
            Ok(Err(err)) => warn!(error = %err, "expiry sweep failed"),
            Err(err) => error!(error = %err, "expiry sweep panicked"),
        }
    }
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server stops abnormally.
pub async fn serve(listener: TcpListener, sink: SharedSink) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("read listener address")?;
    info!(%addr, "listening for webhooks");
    axum::serve(listener, router(sink))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
