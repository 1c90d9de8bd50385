//! Sandbox Engine HTTP Gateway
//!
//! Serves `POST /api/execute` and `GET /api/health` in front of the engine.

use clap::Parser;
use sandbox_engine::config::{validate_config, Config};
use sandbox_engine::gateway::{serve, GatewayState};
use sandbox_engine::sandbox::SandboxEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sandbox-gateway", about = "Sandbox Engine HTTP Gateway")]
struct Args {
    /// Bind address (overrides gateway.bind)
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides gateway.port)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sandbox_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("{}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("{}", issue);
        }
        anyhow::bail!("Invalid configuration");
    }

    let engine = SandboxEngine::connect(config.sandbox.clone())?;
    let report = engine.health().report().await;
    if report.docker {
        info!("{}", report.info);
    } else {
        warn!("{}", report.info);
    }

    let state = GatewayState::new(Arc::new(engine), config.gateway.max_concurrent);

    let bind = args.bind.unwrap_or(config.gateway.bind);
    let port = args.port.unwrap_or(config.gateway.port);
    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await?;

    Ok(())
}
