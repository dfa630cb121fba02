//! Admission webhook server.
//!
//! Serves the `/mutate` endpoint together with the health and metrics routes
//! on a single TLS listener. Register it with a MutatingWebhookConfiguration
//! for `CREATE` on `pods`.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tracing::{error, info};

use crate::health::{HealthState, create_router};
use crate::webhooks::mutate::mutate_review;
use crate::webhooks::policy::InjectionPolicy;
use crate::webhooks::response::encode_review;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";

/// Largest AdmissionReview body accepted (API server object size limit plus envelope)
const MAX_BODY_BYTES: usize = 3 * 1024 * 1024;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub policy: Arc<InjectionPolicy>,
    pub health: Arc<HealthState>,
}

impl WebhookState {
    pub fn new(policy: Arc<InjectionPolicy>, health: Arc<HealthState>) -> Self {
        Self { policy, health }
    }
}

/// Create the webhook router, including health and metrics routes
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    let health = state.health.clone();
    Router::new()
        .route("/mutate", post(mutate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
        .merge(create_router(health))
}

/// Mutating admission handler for pods
async fn mutate(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let started = Instant::now();
    info!(bytes = body.len(), "New mutate request");

    let mutation = mutate_review(&body, &state.policy);

    state.health.metrics.record_admission(
        mutation.outcome,
        mutation.patch_operations,
        started.elapsed().as_secs_f64(),
    );

    match encode_review(&mutation.review) {
        Ok(bytes) => (
            mutation.status,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, outcome = %mutation.outcome, "Failed to encode admission review");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("[{}] {}", e.reason(), e)).into_response()
        }
    }
}

/// Errors that can occur when running the webhook server
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS
///
/// Readiness flips to true once the certificate and key are loaded. The
/// server stops when `handle` is told to shut down.
///
/// # Arguments
/// * `state` - Policy and health state shared by all requests
/// * `addr` - Listen address
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
/// * `handle` - Handle used to trigger graceful shutdown
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    addr: SocketAddr,
    cert_path: &Path,
    key_path: &Path,
    handle: Handle,
) -> Result<(), WebhookError> {
    let health = state.health.clone();
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(format!("{}: {}", cert_path.display(), e)))?;

    health.set_ready(true).await;
    info!(%addr, "Listening with TLS");

    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
