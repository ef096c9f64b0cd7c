use anyhow::Context;
use clap::{Parser, Subcommand};
use futuresbot::{build_auto_trader, AutoTrader, EntryOutcome, ExitOutcome, OrderSide, Settings};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Parser)]
#[command(name = "futuresbot", about = "RSI entry / take-profit bot for perpetual futures")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the entry and exit loops until Ctrl+C (default)
    Run,
    /// Report whether SYMBOL has an open position
    HasOpen { symbol: String },
    /// Cancel all open orders on SYMBOL
    CancelAll { symbol: String },
    /// Evaluate the profit target of SYMBOL's open position
    EvaluateProfit { symbol: String },
    /// Close SYMBOL's open positions at market
    Close {
        symbol: String,
        /// Only close positions this order side reduces (BUY closes SHORT, SELL closes LONG)
        #[arg(long)]
        side: Option<OrderSide>,
    },
    /// Evaluate the RSI entry condition for SYMBOL
    Rsi { symbol: String },
    /// Open a market position
    Open {
        symbol: String,
        side: OrderSide,
        /// Order quantity; auto-sized from MIN_NOTIONAL when omitted
        #[arg(long)]
        quantity: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load settings")?;
    tracing::debug!(?settings, "Settings loaded");

    let trader = Arc::new(
        build_auto_trader(&settings)
            .await
            .context("failed to initialise trading core")?,
    );

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(trader, &settings).await,
        Command::HasOpen { symbol } => {
            let open = trader.positions().has_open_position(&symbol).await?;
            println!("{}: {}", symbol, if open { "position open" } else { "no position" });
            Ok(())
        }
        Command::CancelAll { symbol } => {
            trader.executor().cancel_all_open_orders(&symbol).await?;
            println!("{}: all open orders cancelled", symbol);
            Ok(())
        }
        Command::EvaluateProfit { symbol } => {
            match trader.positions().evaluate_profit_target(&symbol).await? {
                Some(eval) => println!(
                    "{} {}: entry {} mark {} target {} -> {}",
                    symbol,
                    eval.side,
                    eval.entry_price,
                    eval.mark_price,
                    eval.target_price,
                    if eval.should_take_profit { "take profit" } else { "hold" }
                ),
                None => println!("{}: no position", symbol),
            }
            Ok(())
        }
        Command::Close { symbol, side } => {
            let acks = trader.executor().close_position_market(&symbol, side).await?;
            println!("{}: {} closing order(s) submitted", symbol, acks.len());
            Ok(())
        }
        Command::Rsi { symbol } => {
            match trader.entry().evaluate(&symbol).await? {
                Some(signal) => println!(
                    "{}: RSI {:.2}, lows {} -> {}, entry {}",
                    symbol,
                    signal.rsi,
                    signal.prev_low,
                    signal.latest_low,
                    if signal.should_enter { "met" } else { "not met" }
                ),
                None => println!("{}: not enough candle history", symbol),
            }
            Ok(())
        }
        Command::Open {
            symbol,
            side,
            quantity,
        } => {
            let ack = trader
                .executor()
                .open_market_position(&symbol, side, quantity.as_deref())
                .await?;
            println!("{}: order {} {}", symbol, ack.order_id, ack.status);
            Ok(())
        }
    }
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "futuresbot=info".into()),
        )
        .init();
}

async fn run(trader: Arc<AutoTrader>, settings: &Settings) -> anyhow::Result<()> {
    let symbols = settings.trading.symbols.clone();

    tracing::info!("🚀 futuresbot starting");
    tracing::info!("  Symbols: {}", symbols.join(", "));
    tracing::info!("  Entry check: every {}s", settings.trading.entry_interval_secs);
    tracing::info!("  Exit check: every {}s", settings.trading.exit_interval_secs);
    tracing::info!(
        "  Leverage: {}x {}",
        settings.binance.default_leverage,
        settings.binance.margin_type.as_str()
    );

    let entry = {
        let trader = trader.clone();
        let symbols = symbols.clone();
        move || {
            let trader = trader.clone();
            let symbols = symbols.clone();
            async move { entry_phase(&trader, &symbols).await }
        }
    };
    let exit = move || {
        let trader = trader.clone();
        let symbols = symbols.clone();
        async move { exit_phase(&trader, &symbols).await }
    };

    let scheduler = tokio::spawn(schedule(
        Duration::from_secs(settings.trading.entry_interval_secs),
        Duration::from_secs(settings.trading.exit_interval_secs),
        entry,
        exit,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        result = scheduler => {
            tracing::error!("Scheduler exited: {:?}", result);
        }
    }

    tracing::info!("👋 futuresbot stopped");
    Ok(())
}

/// Drives both phases from a single task, so a symbol's entry and exit
/// evaluations never run at the same time.
async fn schedule<E, EF, X, XF>(entry_period: Duration, exit_period: Duration, mut entry: E, mut exit: X)
where
    E: FnMut() -> EF,
    EF: Future<Output = ()>,
    X: FnMut() -> XF,
    XF: Future<Output = ()>,
{
    let mut entry_ticker = interval(entry_period);
    entry_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut exit_ticker = interval(exit_period);
    exit_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = entry_ticker.tick() => entry().await,
            _ = exit_ticker.tick() => exit().await,
        }
    }
}

/// Each symbol is evaluated at most once per tick; a failure skips that
/// symbol until the next tick.
async fn entry_phase(trader: &AutoTrader, symbols: &[String]) {
    for symbol in symbols {
        match trader.evaluate_entry(symbol).await {
            Ok(EntryOutcome::Opened(ack)) => {
                tracing::info!(symbol = %symbol, order_id = ack.order_id, "📈 Entry order placed")
            }
            Ok(outcome) => tracing::debug!(symbol = %symbol, ?outcome, "No entry"),
            Err(e) => tracing::error!(symbol = %symbol, error = %e, "🔴 Entry evaluation failed"),
        }
    }
}

async fn exit_phase(trader: &AutoTrader, symbols: &[String]) {
    // Configured symbols plus anything else currently held
    let mut all: BTreeSet<String> = symbols.iter().cloned().collect();
    match trader.positions().open_position_symbols().await {
        Ok(open) => all.extend(open),
        Err(e) => {
            tracing::error!(error = %e, "🔴 Failed to list open positions");
            return;
        }
    }

    for symbol in &all {
        match trader.evaluate_exit(symbol).await {
            Ok(ExitOutcome::Closed { evaluation, orders }) => tracing::info!(
                symbol = %symbol,
                target = %evaluation.target_price,
                orders = orders.len(),
                "💰 Take-profit executed"
            ),
            Ok(outcome) => tracing::debug!(symbol = %symbol, ?outcome, "No exit"),
            Err(e) => tracing::error!(symbol = %symbol, error = %e, "🔴 Exit evaluation failed"),
        }
    }
}
