use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use fishhunt_execution::{Engine, InventoryLedger, SessionLog, WalletShim};
use fishhunt_game_server::{
    config::{LogFormat, StoreConfig, WalletConfig},
    hub::Hub,
    store::StoreBackend,
    wallet::WalletBackend,
    ws::{self, AppState},
    Config, ValidatedConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn print_dry_run_report(config: &ValidatedConfig) {
    println!("dry-run report");
    println!("  listen: {}", config.listen);
    println!(
        "  logging: level={} format={:?}",
        config.log_level, config.log_format
    );
    println!(
        "  hub: queue={} broadcast={} max_rooms={} bootstrap_per_tier={}",
        config.hub.message_queue_size,
        config.hub.broadcast_buffer,
        config.hub.max_rooms,
        config.hub.bootstrap_rooms_per_tier
    );
    println!(
        "  rooms: tick={:?} snapshot={:?} idle_timeout={:?} min_join_balance={}",
        config.hub.tick_interval,
        config.hub.snapshot_interval,
        config.hub.room_idle_timeout,
        config.hub.min_join_balance
    );
    println!(
        "  transport: max_connections={} outbound={} max_message_size={}B ping={:?} write_timeout={:?}",
        config.transport.max_connections,
        config.transport.outbound_buffer,
        config.transport.max_message_size,
        config.transport.ping_interval,
        config.transport.write_timeout
    );
    match &config.wallet {
        WalletConfig::Memory {
            initial_balance,
            timeout_ms,
        } => println!("  wallet: memory initial_balance={initial_balance} timeout={timeout_ms}ms"),
        WalletConfig::Http {
            base_url,
            timeout_ms,
        } => println!("  wallet: http base_url={base_url} timeout={timeout_ms}ms"),
    }
    match &config.store {
        StoreConfig::Memory => println!("  store: memory"),
        StoreConfig::Redis { prefix, .. } => println!("  store: redis prefix={prefix}"),
    }
    println!(
        "  rtp: cold_start_threshold={} tolerance={}",
        config.rtp.cold_start_threshold, config.rtp.tolerance
    );
    for (tier, tier_config) in config.hub.catalog.iter() {
        println!(
            "  tier {tier}: bets={}..={} players={} target_rtp={}",
            tier_config.min_bet, tier_config.max_bet, tier_config.max_players, tier_config.target_rtp
        );
    }
}

fn init_tracing(config: &ValidatedConfig) {
    let builder = tracing_subscriber::fmt().with_max_level(config.log_level);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn main() {
    if let Err(err) = main_result() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn main_result() -> Result<()> {
    // Parse arguments
    let matches = Command::new("fishhunt-game-server")
        .about("Real-time fish hunting rooms over WebSocket.")
        .arg(Arg::new("config").long("config").required(true))
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate config and exit without starting the server")
                .action(ArgAction::SetTrue),
        )
        .get_matches();
    let dry_run = matches.get_flag("dry-run");

    // Load config
    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let config_file = std::fs::read_to_string(config_file)
        .with_context(|| format!("Could not read config file {config_file}"))?;
    let mut config: Config =
        serde_yaml::from_str(&config_file).context("Could not parse config file")?;
    config.apply_env(|key| std::env::var(key).ok());
    let config = config.validate().context("Invalid config")?;

    if dry_run {
        print_dry_run_report(&config);
        println!("config ok");
        return Ok(());
    }

    init_tracing(&config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: ValidatedConfig) -> Result<()> {
    let wallet = WalletBackend::from_config(&config.wallet);
    let store = StoreBackend::from_config(&config.store).context("Invalid inventory store")?;
    info!(
        listen = %config.listen,
        wallet = wallet.name(),
        store = store.name(),
        "starting game server"
    );

    let (sessions, session_writer) =
        SessionLog::start(store.sessions(), config.hub.message_queue_size);
    let ledger = Arc::new(InventoryLedger::new(store));
    let hydrated = ledger.hydrate().await;
    info!(tiers = hydrated, "inventory hydrated");
    let engine = Engine::new(
        WalletShim::new(wallet, Duration::from_millis(config.wallet.timeout_ms())),
        ledger,
        config.rtp,
        config.math,
    )
    .with_sessions(sessions.clone());

    let hub = Hub::start(engine, config.hub);
    let rooms = hub.bootstrap().context("Failed to open bootstrap rooms")?;
    info!(rooms = rooms.len(), "bootstrap rooms open");

    let app = ws::router(AppState::new(hub.clone(), config.transport));
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Could not bind {}", config.listen))?;
    info!(addr = %config.listen, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(?err, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
        })
        .await
        .context("Server failed")?;

    let reports = hub.shutdown("server shutdown").await;
    for report in &reports {
        info!(
            room_id = %report.room_id,
            tier = %report.tier,
            bullets = report.stats.bullets_fired,
            wagered = report.stats.total_wagered,
            paid = report.stats.total_paid,
            "room report"
        );
    }
    sessions.flush().await;
    session_writer.abort();
    info!(rooms = reports.len(), "game server stopped");
    Ok(())
}
