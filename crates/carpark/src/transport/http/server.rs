//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::service::ParkingService;

use super::middleware::{Credentials, RateLimiter, basic_auth, rate_limit};
use super::routes::routes;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// If true, ignore SIGTERM and wait for explicit /shutdown or SIGINT.
    pub await_explicit_shutdown: bool,
    /// Requests allowed per client address per minute. Zero disables limiting.
    pub max_requests_per_minute: u32,
    /// Basic auth credentials. `None` leaves the API open.
    pub credentials: Option<Credentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            await_explicit_shutdown: false,
            max_requests_per_minute: 60,
            credentials: None,
        }
    }
}

/// Routes wrapped in the guards `config` asks for.
///
/// Rate limiting runs before authentication.
pub fn app(config: &ServerConfig, service: Arc<ParkingService>) -> Router {
    let mut app = routes(service);

    if let Some(credentials) = config.credentials.clone() {
        info!(username = %credentials.username(), "Basic auth enabled");
        app = app.layer(axum::middleware::from_fn_with_state(
            Arc::new(credentials),
            basic_auth,
        ));
    }

    let limiter = RateLimiter::per_minute(config.max_requests_per_minute);
    if limiter.is_enabled() {
        info!(
            max_requests_per_minute = config.max_requests_per_minute,
            "Rate limiting enabled"
        );
        app = app.layer(axum::middleware::from_fn_with_state(
            Arc::new(limiter),
            rate_limit,
        ));
    }

    app
}

/// Start the HTTP server with provided service.
pub async fn serve(config: ServerConfig, service: Arc<ParkingService>) -> anyhow::Result<()> {
    let shutdown_rx = service.shutdown_rx();
    let app = app(&config, Arc::clone(&service));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Starting carpark server on {}", actual_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.await_explicit_shutdown, shutdown_rx))
    .await?;

    info!(
        available = service.available_slots(),
        total = service.total_slots(),
        "Server shutdown complete"
    );

    Ok(())
}

/// Wait for shutdown signal (SIGTERM, SIGINT, or /shutdown endpoint).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed, which only happens when the
/// tokio runtime is misconfigured at startup.
async fn shutdown_signal(await_explicit_shutdown: bool, mut shutdown_rx: watch::Receiver<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler - is tokio runtime configured correctly?");
    };

    #[cfg(unix)]
    let terminate = async {
        if await_explicit_shutdown {
            tracing::info!("await_explicit_shutdown enabled, ignoring SIGTERM");
            std::future::pending::<()>().await
        } else {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect(
                    "failed to install SIGTERM handler - is tokio runtime configured correctly?",
                )
                .recv()
                .await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let explicit_shutdown = async {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = explicit_shutdown => {
            info!("Shutdown requested via /shutdown endpoint...");
        }
    }
}
