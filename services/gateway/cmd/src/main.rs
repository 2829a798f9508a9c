//! Radio gateway binary.
//!
//! Bridges an encrypted nRF24 sensor network to a topic-routed message bus:
//! polls the radio, routes decoded frames through the channel tables and
//! transmits replies and subscribed bus messages back to the nodes.

use anyhow::{Context, Result};
use clap::Parser;
use gateway_bus::{Bus, BusConnection, MemoryBus};
use gateway_radio::{LinkConfig, MemoryRadio, RadioConfig, RadioDriver, RadioLink, UdpRadio};
use gateway_router::{Router, RouterConfig};
use gateway_transform::TransformRegistry;
use gateway_wire::FrameCodec;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{BusBackend, GatewayConfig};
use logging::GatewayLogFormatter;

/// Frames read from the radio waiting for the router
const FRAME_QUEUE: usize = 64;
/// Frames from the router waiting for the transmitter
const OUTBOUND_QUEUE: usize = 64;

/// nRF24 sensor network gateway
#[derive(Parser, Debug)]
#[command(name = "rf-gateway", version, about = "nRF24 sensor network to message bus gateway")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "gateway.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Idle time between radio polls, e.g. 40ms
    #[arg(long)]
    poll_interval: Option<humantime::Duration>,

    /// Wait before answering a registration, e.g. 20ms
    #[arg(long)]
    register_ack_delay: Option<humantime::Duration>,

    /// Radio bridge address, e.g. 127.0.0.1:7400
    #[arg(long)]
    radio_bridge: Option<SocketAddr>,

    /// Run against an in-memory radio instead of the bridge
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("rf_gateway={}", args.log_level).parse()?)
        .add_directive(format!("gateway_wire={}", args.log_level).parse()?)
        .add_directive(format!("gateway_registry={}", args.log_level).parse()?)
        .add_directive(format!("gateway_transform={}", args.log_level).parse()?)
        .add_directive(format!("gateway_bus={}", args.log_level).parse()?)
        .add_directive(format!("gateway_radio={}", args.log_level).parse()?)
        .add_directive(format!("gateway_router={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(GatewayLogFormatter::new("gateway"))
        .init();

    info!("Starting radio gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = GatewayConfig::load_from_file(&args.config)?;
    if let Some(interval) = args.poll_interval {
        config.gateway.poll_interval_ms = millis(*interval, "poll-interval")?;
    }
    if let Some(delay) = args.register_ack_delay {
        config.gateway.register_ack_delay_ms = millis(*delay, "register-ack-delay")?;
    }
    if let Some(bridge) = args.radio_bridge {
        config.radio.bridge = bridge;
    }

    let key = config.preshared_key()?;
    let identity = config.identity()?;
    let radio_config = config.radio_config()?;
    component_info!("router", "Gateway identity {}", hex::encode(identity));

    let bus: Arc<dyn Bus> = match config.bus.backend {
        BusBackend::Memory => {
            component_warn!("bus", "Using the in-memory bus; messages stay inside this process");
            Arc::new(MemoryBus::new())
        }
        BusBackend::Redis => connect_redis(&config.bus.connection).await?,
    };

    let router_config = RouterConfig {
        identity,
        exchange: config.bus.exchange.clone(),
        queue: config.bus.queue.clone(),
    };
    let link_config = LinkConfig {
        gateway_address: radio_config.address,
        poll_interval: config.poll_interval(),
        register_ack_delay: config.register_ack_delay(),
        ack_payload: router_config.server_id().to_vec(),
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();

    let mut router = Router::new(
        router_config,
        FrameCodec::new(&key),
        TransformRegistry::with_builtins(),
        bus,
    );
    router.set_outbound_sender(outbound_tx);
    router
        .attach_bus(delivery_tx)
        .await
        .context("failed to attach to the message bus")?;

    let channels = Channels {
        outbound_rx,
        delivery_rx,
    };

    if args.dry_run {
        component_warn!("radio", "Dry run: using an in-memory radio, no node will be reached");
        serve(MemoryRadio::new(), &radio_config, link_config, router, channels).await
    } else {
        let driver = UdpRadio::connect(config.radio.bind, config.radio.bridge, config.reply_timeout())
            .await
            .with_context(|| format!("failed to reach radio bridge at {}", config.radio.bridge))?;
        serve(driver, &radio_config, link_config, router, channels).await
    }
}

/// Router-side ends of the queues created before the radio is chosen
struct Channels {
    outbound_rx: mpsc::Receiver<gateway_wire::OutboundFrame>,
    delivery_rx: mpsc::UnboundedReceiver<gateway_bus::Delivery>,
}

/// Start the radio, run the poll, transmit and routing tasks until a signal
async fn serve<D: RadioDriver>(
    driver: D,
    radio_config: &RadioConfig,
    link_config: LinkConfig,
    router: Router,
    channels: Channels,
) -> Result<()> {
    let link = RadioLink::new(driver, link_config);
    link.start(radio_config)
        .await
        .context("failed to configure the radio")?;
    let link_stats = link.stats();

    let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll_task = tokio::spawn(link.clone().run_poll(frame_tx, shutdown_rx.clone()));
    let transmit_task = tokio::spawn(link.run_transmit(channels.outbound_rx, shutdown_rx.clone()));
    let router_task = tokio::spawn(router.run(frame_rx, channels.delivery_rx, shutdown_rx));

    component_info!("gateway", "Gateway running, press Ctrl-C to stop");
    wait_for_signal().await?;

    info!("Initiating graceful shutdown");
    let _ = shutdown_tx.send(true);

    let stats = router_task.await.context("router task failed")?;
    if let Err(e) = poll_task.await {
        warn!("Poll task ended abnormally: {}", e);
    }
    if let Err(e) = transmit_task.await {
        warn!("Transmit task ended abnormally: {}", e);
    }

    component_info!("radio", "Link stats: {}", link_stats.summary());
    match serde_json::to_string(&stats) {
        Ok(json) => component_info!("router", "Router stats: {}", json),
        Err(e) => warn!("Could not render router stats: {}", e),
    }

    info!("Radio gateway shutdown complete");
    Ok(())
}

/// Whole milliseconds of a command-line duration
fn millis(duration: Duration, flag: &str) -> Result<u64> {
    u64::try_from(duration.as_millis()).with_context(|| format!("--{} is too large", flag))
}

async fn wait_for_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("Received SIGINT");
        }
    }
    Ok(())
}

#[cfg(feature = "redis-bus")]
async fn connect_redis(settings: &BusConnection) -> Result<Arc<dyn Bus>> {
    let bus = gateway_bus::RedisBus::connect(settings)
        .await
        .with_context(|| format!("failed to connect to redis at {}:{}", settings.host, settings.port))?;
    component_info!("bus", "Connected to redis at {}:{}", settings.host, settings.port);
    Ok(Arc::new(bus))
}

#[cfg(not(feature = "redis-bus"))]
async fn connect_redis(settings: &BusConnection) -> Result<Arc<dyn Bus>> {
    anyhow::bail!(
        "bus backend 'redis' ({}:{}) requires building with the redis-bus feature",
        settings.host,
        settings.port
    )
}
