use clap::Parser;
use copytrader::config::Config;
use copytrader::core::exit_manager::{ExitConfig as CoreExitConfig, ExitManager, TakeProfitTarget};
use copytrader::core::ledger::PositionLedger;
use copytrader::core::lookup_table::LookupTableResolver;
use copytrader::core::orchestrator::{CopyOrchestrator, OrchestratorConfig};
use copytrader::core::prebuilt::PreBuiltCache;
use copytrader::core::quality::QualityFilter;
use copytrader::core::quote_cache::QuoteCache;
use copytrader::core::submitter::RaceSubmitter;
use copytrader::core::types::{QualityLimits, RiskLimits, USDC_MINT};
use copytrader::core::watchlist::Watchlist;
use copytrader::events::EventBus;
use copytrader::logger::{self, LogTag};
use copytrader::net::bundle_client::BundleRelayClient;
use copytrader::net::price_client::PriceClient;
use copytrader::net::quote_client::QuoteClient;
use copytrader::net::rpc_client::RpcClient;
use copytrader::net::stream_client::{self, StreamConfig as NetStreamConfig};
use copytrader::pipeline;
use solana_sdk::signature::{read_keypair_file, Keypair};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "copytrader", about = "Real-time trade-ingestion and copy-trading engine")]
struct Cli {
    #[arg(long, default_value = "config.json")]
    config: String,
    #[arg(long)]
    keypair: Option<String>,
}

fn load_keypair(path: Option<&str>) -> Arc<Keypair> {
    match path.and_then(|p| read_keypair_file(p).ok()) {
        Some(kp) => Arc::new(kp),
        None => {
            logger::warn(LogTag::System, "no keypair file provided or readable; using an ephemeral signer");
            Arc::new(Keypair::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            logger::error(LogTag::System, &format!("failed to load config {}: {}", cli.config, e));
            std::process::exit(1);
        }
    };
    logger::info(LogTag::System, &format!("loaded configuration from {}", cli.config));

    let keypair = load_keypair(cli.keypair.as_deref());
    let (events, mut event_rx) = EventBus::new();
    tokio::spawn(async move {
        while let Ok((event, ts)) = event_rx.recv().await {
            logger::info(LogTag::System, &format!("[{}] {:?}", ts.format("%H:%M:%S"), event));
        }
    });

    let rpc = Arc::new(RpcClient::new(config.rpc.endpoint.clone()));
    let quote_client = Arc::new(QuoteClient::new("https://quote-api.example".to_string(), None));
    quote_client.warm_up().await;
    let price_client = Arc::new(PriceClient::new("https://price-api.example".to_string()));
    let metadata_client = Arc::new(copytrader::net::metadata_client::MetadataClient::new(
        "https://metadata-api.example".to_string(),
    ));
    let bundle_relay = Arc::new(BundleRelayClient::new("https://relay.example".to_string()));

    let watchlist = Arc::new(Watchlist::new());
    let resolver = Arc::new(LookupTableResolver::new(rpc.clone()));

    let risk_limits = RiskLimits {
        max_position_usdc: config.risk.max_position_usdc,
        max_total_exposure_usdc: config.risk.max_total_exposure_usdc,
        max_open_positions: config.risk.max_open_positions,
        min_usdc_reserve: config.risk.min_usdc_reserve,
    };
    let ledger = Arc::new(PositionLedger::new(risk_limits, events.clone()));

    let quality_limits = QualityLimits {
        min_liquidity_usdc: config.filter.min_liquidity_usdc,
        max_price_impact_pct: config.filter.max_price_impact_pct,
        min_token_age_seconds: config.filter.min_token_age_seconds,
        min_24h_volume_usdc: config.filter.min_24h_volume_usdc,
        max_recent_pump_pct: config.filter.max_recent_pump_pct,
        whitelist: config.trade.allowed_tokens.iter().cloned().collect::<HashSet<_>>(),
    };
    let quality = Arc::new(QualityFilter::new(metadata_client, quality_limits));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let quotes = Arc::new(QuoteCache::new(quote_client.clone(), config.trade.slippage_bps));
    let prebuilt = Arc::new(PreBuiltCache::new(
        quotes.clone(),
        quote_client.clone(),
        keypair.clone(),
        config.trade.priority_fee_microlamports,
    ));

    let copy_amount_raw = (config.trade.amount_usdc * 1_000_000.0).round() as u128;
    {
        let quotes = quotes.clone();
        let usdc_mint = USDC_MINT.to_string();
        let mints = config.trade.allowed_tokens.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { quotes.run_refresh_loop(usdc_mint, mints, copy_amount_raw, shutdown).await });
    }
    {
        let prebuilt = prebuilt.clone();
        let usdc_mint = USDC_MINT.to_string();
        let mints = config.trade.allowed_tokens.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { prebuilt.run_refresh_loop(usdc_mint, mints, copy_amount_raw, shutdown).await });
    }
    let submitter = Arc::new(RaceSubmitter::new(
        rpc.clone(),
        bundle_relay,
        config.trade.use_bundle_relay,
        config.trade.bundle_tip_lamports,
        keypair.clone(),
    ));
    submitter.init_relay().await;

    let orchestrator_config = OrchestratorConfig {
        copy_buys_only: config.trade.copy_buys_only,
        allowed_tokens: config.trade.allowed_tokens.clone(),
        min_trade_usdc: config.trade.min_trade_usdc,
        usdc_mint: USDC_MINT.to_string(),
    };
    let orchestrator = Arc::new(CopyOrchestrator::new(
        orchestrator_config,
        quotes.clone(),
        prebuilt,
        quote_client.clone(),
        keypair.clone(),
        config.trade.priority_fee_microlamports,
        quality,
        ledger.clone(),
        submitter.clone(),
        events.clone(),
    ));

    let exit_config = CoreExitConfig {
        enabled: config.exit.enabled,
        take_profit_targets: config
            .exit
            .take_profit_targets
            .iter()
            .map(|(profit_pct, sell_pct)| TakeProfitTarget { profit_pct: *profit_pct, sell_pct: *sell_pct })
            .collect(),
        stop_loss_pct: config.exit.stop_loss_pct,
        max_hold_hours: config.exit.max_hold_hours,
        trailing_stop_pct: config.exit.trailing_stop_pct,
        trailing_activation_pct: config.exit.trailing_activation_pct,
        check_interval_seconds: config.exit.check_interval_seconds,
    };
    let exit_manager = Arc::new(ExitManager::new(
        exit_config,
        ledger.clone(),
        price_client,
        quotes,
        quote_client,
        keypair,
        config.trade.priority_fee_microlamports,
        submitter,
        events.clone(),
        USDC_MINT.to_string(),
    ));

    let exit_rx = shutdown_rx.clone();
    let exit_manager_handle = exit_manager.clone();
    tokio::spawn(async move { exit_manager_handle.run(exit_rx).await });

    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel(256);
    let (state_tx, mut state_rx) = tokio::sync::mpsc::channel(32);
    let stream_cfg = NetStreamConfig {
        endpoint: config.stream.endpoint.clone(),
        reconnect_delay: Duration::from_millis(config.stream.reconnect_ms),
        max_attempts: config.stream.max_attempts,
    };
    let stream_shutdown = shutdown_rx.clone();
    tokio::spawn(async move { stream_client::run(stream_cfg, frame_tx, state_tx, stream_shutdown).await });

    tokio::spawn(async move {
        while let Some(state) = state_rx.recv().await {
            logger::info(LogTag::Ingest, &format!("{:?}", state));
        }
    });

    let copy_amount_usdc = config.trade.amount_usdc;
    let seen = Arc::new(copytrader::core::detector::SeenSet::new());
    let ingestion_loop = {
        let watchlist = watchlist.clone();
        let resolver = resolver.clone();
        let rpc = rpc.clone();
        let orchestrator = orchestrator.clone();
        let seen = seen.clone();
        async move {
            while let Some(frame) = frame_rx.recv().await {
                let trades =
                    pipeline::process_payload(frame.slot, &frame.entries, &watchlist, &resolver, &rpc, &seen).await;
                for trade in trades {
                    events.publish(copytrader::events::EngineEvent::TradeDetected { trade: trade.clone() });
                    let outcome = orchestrator.handle_trade(trade, copy_amount_usdc, 0.0).await;
                    logger::info(LogTag::Copy, &format!("{:?}", outcome));
                }
            }
        }
    };

    tokio::select! {
        _ = ingestion_loop => {}
        _ = tokio::signal::ctrl_c() => {
            logger::info(LogTag::System, "shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    }
}
