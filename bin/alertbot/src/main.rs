mod cli;

use std::collections::BTreeSet;
use std::sync::Arc;

use teloxide::Bot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use backtest::{run_backtest_from_source, BacktestConfig, BacktestRequest};
use clap::Parser;
use cli::{BacktestArgs, Cli, Commands};
use common::{AlertSink, Config, EngineCommand};
use engine::{BinanceMarketData, Engine, LogSink, RetryPolicy, StrategyManager};
use strategy::{build_strategy, Strategy, StrategyFileConfig};
use telegram_ctrl::{start_bot, BotDeps, TelegramSink};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .unwrap_or_else(|e| panic!("Failed to load strategy config: {e}"));

    let source = BinanceMarketData::new(cfg.market_data_url.clone(), cfg.fetch_timeout)
        .unwrap_or_else(|e| panic!("Failed to build market data client: {e}"));

    match cli.command {
        None => run_live(cfg, strategy_file, source).await,
        Some(Commands::Backtest(args)) => {
            if let Err(e) = args.validate() {
                eprintln!("{e}");
                std::process::exit(2);
            }
            run_backtest(strategy_file, source, args).await
        }
    }
}

async fn run_live(cfg: Config, strategy_file: StrategyFileConfig, source: BinanceMarketData) {
    info!(
        strategies = strategy_file.strategies.len(),
        telegram = cfg.telegram_enabled(),
        "Alert bot starting"
    );

    // ── Delivery ──────────────────────────────────────────────────────────────
    let bot = cfg.telegram_token.clone().map(Bot::new);
    let sink: Arc<dyn AlertSink> = match &bot {
        Some(bot) => Arc::new(TelegramSink::new(bot.clone(), &cfg.telegram_allowed_user_ids)),
        None => {
            info!("No Telegram token, alerts go to the log");
            Arc::new(LogSink)
        }
    };

    // ── Strategy manager ──────────────────────────────────────────────────────
    let manager = Arc::new(StrategyManager::new(
        Arc::new(source),
        sink,
        RetryPolicy::from_config(&cfg),
    ));
    for s in &strategy_file.strategies {
        manager
            .register_from_config(s)
            .await
            .unwrap_or_else(|e| panic!("Failed to register strategy '{}': {e}", s.id));
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(manager.clone(), cfg.status_interval);
    tokio::spawn(engine.run());
    handle.send(EngineCommand::Start).await;
    manager.report_status().await;

    // ── Telegram commands ─────────────────────────────────────────────────────
    if let Some(bot) = bot {
        let deps = BotDeps {
            engine: handle.clone(),
            allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
        };
        tokio::spawn(start_bot(bot, deps));
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received. Exiting.");
    handle.send(EngineCommand::Stop).await;
}

async fn run_backtest(strategy_file: StrategyFileConfig, source: BinanceMarketData, args: BacktestArgs) {
    let strategies: Vec<Box<dyn Strategy>> = strategy_file
        .strategies
        .iter()
        .filter(|s| s.enabled)
        .map(build_strategy)
        .collect::<Result<_, _>>()
        .unwrap_or_else(|e| panic!("Invalid strategy config: {e}"));

    let symbols = if args.symbols.is_empty() {
        strategy_file
            .strategies
            .iter()
            .filter(|s| s.enabled)
            .flat_map(|s| s.symbols.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        args.symbols
    };

    let defaults = BacktestConfig::default();
    let config = BacktestConfig {
        initial_equity: args.initial_equity.unwrap_or(defaults.initial_equity),
        slippage_bps: args.slippage_bps.unwrap_or(defaults.slippage_bps),
        ..defaults
    };
    let request = BacktestRequest { symbols, start: args.from, end: args.to };

    let report = match run_backtest_from_source(&source, strategies, &request, config).await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Backtest failed");
            std::process::exit(1);
        }
    };

    let m = &report.metrics;
    info!(
        trades = m.total_trades,
        win_rate = m.win_rate,
        profit_factor = ?m.profit_factor,
        total_return_pct = m.total_return_pct * 100.0,
        max_drawdown_pct = m.max_drawdown_pct * 100.0,
        final_equity = m.final_equity,
        "Backtest summary"
    );

    let json = report
        .to_json()
        .unwrap_or_else(|e| panic!("Failed to serialize report: {e}"));
    match args.out {
        Some(path) => {
            std::fs::write(&path, json).unwrap_or_else(|e| panic!("Failed to write {path}: {e}"));
            info!(path = %path, "Report written");
        }
        None => println!("{json}"),
    }
}
