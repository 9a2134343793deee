use anyhow::{Context, Result};
use hubbridge::api::{serve, HttpLocalApi, InboundState};
use hubbridge::bridge::run_timer;
use hubbridge::bus::{EventBus, LocalEventBus};
use hubbridge::config::{load_config, BridgeConfig};
use hubbridge::event::{EventData, EventOrigin, EVENT_HUB_START, EVENT_HUB_STOP};
use hubbridge::forwarding::EventForwarder;
use hubbridge::pool::WorkerPool;
use hubbridge::state::{LocalStateMachine, StateMachine};
use hubbridge::{Bridge, BridgeSettings};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hubbridge=info".into()),
        )
        .init();

    info!("Hubbridge starting...");

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HUBBRIDGE_CONFIG").ok());
    let mut config = match &path {
        Some(path) => {
            load_config(path).with_context(|| format!("Failed to load config from {}", path))?
        }
        None => BridgeConfig::default(),
    };
    config.apply_env();

    if config.remote.is_some() {
        run_bridge(config).await
    } else {
        run_hub(config).await
    }
}

/// Mirror the configured remote hub until Ctrl-C.
async fn run_bridge(config: BridgeConfig) -> Result<()> {
    let settings = BridgeSettings::from_config(&config)?;
    info!(remote = %settings.remote, "Running in bridge mode");

    let local_api = HttpLocalApi::new(config.local.bind_address, config.local.endpoint())
        .with_restrict_origin(config.forwarding.restrict_origin);

    let bridge = Bridge::new(settings)
        .await
        .context("Failed to connect to remote hub")?
        .with_local_provider(local_api);

    if let Err(e) = bridge.start().await {
        error!(error = %e, "Bridge failed to start");
        bridge.stop().await;
        return Err(e).context("Failed to start bridge");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    bridge.stop().await;
    Ok(())
}

/// Serve a standalone hub until Ctrl-C.
async fn run_hub(config: BridgeConfig) -> Result<()> {
    info!(address = %config.local.bind_address, "Running in hub mode");

    let pool = WorkerPool::new(config.pool.workers);
    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new(pool.clone()));
    let states: Arc<dyn StateMachine> = Arc::new(LocalStateMachine::new(bus.clone()));
    let forwarder = Arc::new(EventForwarder::new(
        bus.clone(),
        config.forwarding.restrict_origin,
    )?);

    let state = InboundState {
        bus: bus.clone(),
        states,
        forwarder,
        api_password: config.local.api_password.clone(),
    };
    let server = serve(config.local.bind_address, state).await?;
    let timer = tokio::spawn(run_timer(bus.clone(), config.timer.interval()));

    bus.fire(EVENT_HUB_START, EventData::new(), EventOrigin::Local);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Stopping");
    bus.fire(EVENT_HUB_STOP, EventData::new(), EventOrigin::Local);
    timer.abort();
    server.shutdown().await;

    pool.block_till_done().await;
    pool.stop();
    Ok(())
}
