use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beacon_auth::ChannelAcl;
use beacon_core::config::BeaconConfig;
use beacon_gateway::hub::{heartbeat, ConnectionManager};
use beacon_gateway::observe::TracingObserver;
use beacon_gateway::{build_router, AppState};
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "beacon-gateway", version, about = "Real-time event broadcasting gateway")]
struct Args {
    /// Config file (default: ~/.beacon/beacon.toml)
    #[arg(short, long, env = "BEACON_CONFIG")]
    config: Option<String>,

    /// Override gateway.bind
    #[arg(long)]
    bind: Option<String>,

    /// Override gateway.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_gateway=info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = BeaconConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        BeaconConfig::default()
    });
    if let Some(bind) = args.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    let oracle = beacon_auth::oracle::from_config(&config.auth)
        .context("cannot build permission oracle")?;
    let acl = ChannelAcl::from_table(config.channels.acl.clone());
    info!(oracle = oracle.name(), acl_rules = acl.len(), "permissions loaded");

    let manager = Arc::new(
        ConnectionManager::new(oracle, acl)
            .with_observer(Arc::new(TracingObserver))
            .with_queue_capacity(config.delivery.queue_capacity),
    );
    let heartbeat = heartbeat::spawn(
        manager.clone(),
        Duration::from_secs(config.heartbeat.interval_secs.max(1)),
    );

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port)
        .parse()
        .context("invalid bind address")?;
    let state = Arc::new(AppState::new(config, manager.clone()));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Beacon gateway listening on {}", addr);

    let on_signal = manager.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            let closed = on_signal.shutdown();
            info!(closed, "shutdown requested");
        })
        .await?;

    let _ = heartbeat.await;
    info!("Beacon gateway stopped");
    Ok(())
}
