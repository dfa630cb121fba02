//! pod-volume-injector - mutating admission webhook that injects volumes and
//! volume mounts into every pod created in the cluster.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads the configuration file (exits non-zero on failure)
//! - Serves the webhook, health and metrics routes over TLS until signalled

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use pod_volume_injector::{Config, HealthState, WebhookState, run_webhook_server};

/// Grace period for in-flight admission requests to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

/// Kubernetes mutating admission webhook injecting volumes into pods
#[derive(Parser, Debug)]
#[command(name = "pod-volume-injector", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (YAML or JSON)
    #[arg(long, short, env = "INJECTOR_CONFIG")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pod_volume_injector=info".parse()?),
        )
        .json()
        .init();

    let cli = Cli::parse();

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        return Err("failed to install rustls crypto provider".into());
    }

    let config = Config::load(&cli.config)
        .inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    let addr = config.listen_addr()?;

    info!(
        config = %cli.config.display(),
        volumes = config.policy.volumes.len(),
        volume_mounts = config.policy.volume_mounts.len(),
        on_name_collision = %config.policy.on_name_collision,
        inject_init_containers = config.policy.inject_init_containers,
        "Starting pod-volume-injector"
    );

    let health_state = Arc::new(HealthState::new());
    let state = Arc::new(WebhookState::new(
        Arc::new(config.policy),
        health_state.clone(),
    ));

    let handle = Handle::new();
    let mut server = {
        let handle = handle.clone();
        let tls = config.http.tls;
        tokio::spawn(async move {
            run_webhook_server(state, addr, &tls.cert_file, &tls.key_file, handle).await
        })
    };

    tokio::select! {
        result = &mut server => {
            return match result {
                Ok(Ok(())) => {
                    info!("Webhook server stopped");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Webhook server error");
                    Err(e.into())
                }
                Err(e) => {
                    error!("Webhook server task panicked: {}", e);
                    Err(e.into())
                }
            };
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new work
            health_state.set_ready(false).await;
            handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)));
        }
    }

    match server.await {
        Ok(Err(e)) => error!(error = %e, "Webhook server error during shutdown"),
        Err(e) => error!("Webhook server task panicked: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
