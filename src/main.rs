use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use voice_dialog::bridge::{run_bridged_call, serve_calls, ControlPlane};
use voice_dialog::config::DEFAULT_CONFIG_PATH;
use voice_dialog::nats::{NatsClient, NatsControlPlane, NatsRecognizer, NatsReplicas, NatsSynthesizer};
use voice_dialog::scaling::DeploymentScaler;
use voice_dialog::session::run_digit_call;
use voice_dialog::{
    create_router, AppState, AudioSocketServer, CallRegistry, CallServices, CallToken,
    CancelReason, Config,
};

#[derive(Parser)]
#[command(name = "voice-dialog", version, about = "Voice dialog service for AudioSocket calls")]
struct Cli {
    /// Config file path, without extension
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the AudioSocket dialog server and the status API
    Serve,
    /// Bridge incoming control-plane calls to the AudioSocket service
    Bridge,
    /// Run the DTMF scaling dialog on incoming control-plane calls
    Digits,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let nats = NatsClient::connect(&cfg.nats.url).await?;
    let shutdown = CallToken::new();
    spawn_ctrl_c(shutdown.clone());

    let result = match cli.command {
        Command::Serve => serve(cfg, nats.clone(), shutdown).await,
        Command::Bridge => bridge(cfg, nats.clone(), shutdown).await,
        Command::Digits => digits(cfg, nats.clone(), shutdown).await,
    };

    if let Err(e) = nats.flush().await {
        warn!("{:#}", e);
    }
    result
}

fn spawn_ctrl_c(shutdown: CallToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Shutting down");
        shutdown.cancel(CancelReason::Shutdown);
    });
}

fn call_services(cfg: &Config, nats: &NatsClient, registry: CallRegistry) -> Arc<CallServices> {
    let scaler = DeploymentScaler::new(NatsReplicas::new(nats.clone()), cfg.deployment());
    let services = CallServices::new(
        Arc::new(NatsRecognizer::new(nats.clone())),
        Arc::new(NatsSynthesizer::new(nats.clone())),
        Arc::new(scaler),
        cfg.call_config(),
        cfg.dialog_settings(),
    )
    .with_registry(registry);
    Arc::new(services)
}

async fn serve(cfg: Config, nats: NatsClient, shutdown: CallToken) -> Result<()> {
    let registry = CallRegistry::with_history(cfg.service.call_history);
    let services = call_services(&cfg, &nats, registry.clone());

    let http_addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind status API to {}", http_addr))?;
    info!("Status API listening on {}", http_addr);

    let app = create_router(AppState::new(registry));
    let http_shutdown = shutdown.clone();
    let http = tokio::spawn(async move {
        let result = axum::serve(http_listener, app)
            .with_graceful_shutdown(async move {
                http_shutdown.cancelled().await;
            })
            .await;
        if let Err(e) = result {
            error!("Status API failed: {}", e);
        }
    });

    let server = AudioSocketServer::bind(cfg.service.listen.as_str(), services).await?;
    let result = server.serve(shutdown.clone()).await;

    shutdown.cancel(CancelReason::Shutdown);
    if let Err(e) = http.await {
        warn!("Status API task ended abnormally: {}", e);
    }
    result
}

async fn bridge(cfg: Config, nats: NatsClient, shutdown: CallToken) -> Result<()> {
    let control: Arc<dyn ControlPlane> =
        Arc::new(NatsControlPlane::connect(nats, &cfg.bridge.application).await?);
    let settings = Arc::new(cfg.bridged_call_settings());
    info!(
        "Bridging calls to AudioSocket at {}:{}",
        settings.endpoint.host, settings.endpoint.port
    );

    let handler_control = Arc::clone(&control);
    serve_calls(control, shutdown, move |channel_id, token| {
        let control = Arc::clone(&handler_control);
        let settings = Arc::clone(&settings);
        async move {
            match run_bridged_call(control, &channel_id, &settings, &token).await {
                Ok(end) => info!(channel = %channel_id, ?end, "Bridged call ended"),
                Err(e) => error!(channel = %channel_id, "Bridged call failed: {:#}", e),
            }
        }
    })
    .await
}

async fn digits(cfg: Config, nats: NatsClient, shutdown: CallToken) -> Result<()> {
    let control: Arc<dyn ControlPlane> =
        Arc::new(NatsControlPlane::connect(nats.clone(), &cfg.bridge.application).await?);
    let services = call_services(&cfg, &nats, CallRegistry::new());
    let settle_delay = cfg.bridged_call_settings().settle_delay;

    let handler_control = Arc::clone(&control);
    serve_calls(control, shutdown, move |channel_id, token| {
        let control = Arc::clone(&handler_control);
        let services = Arc::clone(&services);
        async move {
            match run_digit_call(control, &channel_id, &services, settle_delay, &token).await {
                Ok(outcome) => info!(channel = %channel_id, ?outcome, "Digit call ended"),
                Err(e) => error!(channel = %channel_id, "Digit call failed: {:#}", e),
            }
        }
    })
    .await
}
