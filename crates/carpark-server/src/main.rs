//! carpark: serve a parking lot over HTTP.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use carpark::transport::ServerConfig;
use carpark::transport::http::Credentials;
use carpark::{CARPARK_VERSION, ParkingService, VersionInfo};

#[derive(Parser, Debug)]
#[command(name = "carpark")]
#[command(version = CARPARK_VERSION)]
#[command(about = "Fixed-capacity parking lot slot allocation server", long_about = None)]
struct Cli {
    /// Display name of the parking lot
    #[arg(long, default_value = "Demo Parking Lot", env = "PARKING_LOT_NAME")]
    name: String,

    /// Number of parking slots
    #[arg(long, default_value_t = 10, env = "PARKING_LOT_SLOTS")]
    slots: usize,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "CARPARK_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "CARPARK_PORT")]
    port: u16,

    /// Ignore SIGTERM and wait for POST /shutdown or SIGINT
    #[arg(long, env = "CARPARK_AWAIT_EXPLICIT_SHUTDOWN")]
    await_explicit_shutdown: bool,

    /// Requests allowed per client per minute (0 disables)
    #[arg(long, default_value_t = 60, env = "CARPARK_RATE_LIMIT")]
    max_requests_per_minute: u32,

    /// Basic auth username (requires --password)
    #[arg(long, env = "CARPARK_USERNAME", requires = "password")]
    username: Option<String>,

    /// Basic auth password (requires --username)
    #[arg(long, env = "CARPARK_PASSWORD", requires = "username", hide_env_values = true)]
    password: Option<String>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            await_explicit_shutdown: self.await_explicit_shutdown,
            max_requests_per_minute: self.max_requests_per_minute,
            credentials: Credentials::from_parts(self.username.clone(), self.password.clone()),
        }
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("CARPARK_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!("carpark={base_level},carpark_server={base_level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn detect_version() -> VersionInfo {
    let version = VersionInfo::new();
    match std::env::var("CARPARK_BUILD") {
        Ok(build) if !build.is_empty() => version.with_build(build),
        _ => version,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let version = detect_version();
    tracing::info!(version = %version.carpark, build = ?version.build, "carpark starting");

    let service = Arc::new(ParkingService::new().with_version(version));
    service
        .initialize(cli.name.clone(), cli.slots)
        .context("failed to initialize parking lot")?;

    carpark::transport::serve(cli.server_config(), service).await
}
