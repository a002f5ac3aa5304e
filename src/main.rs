use anyhow::Context;
use chrono::Local;
use clap::Parser;
use hybridbot::api::{KisClient, KisCredentials, PricePath, RequestLimiter, SimulatedVenue, Venue};
use hybridbot::execution::{Trader, TraderStatus};
use hybridbot::strategy::HybridStrategy;
use hybridbot::{Settings, TradingMode};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(name = "hybridbot", about = "Staged intraday trend follower for a single instrument")]
struct Args {
    /// Config file layered over config/default.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Override the trading mode (paper | live)
    #[arg(long)]
    mode: Option<TradingMode>,

    /// Override the traded symbol
    #[arg(long)]
    symbol: Option<String>,

    /// Run a single tick, print the status and exit
    #[arg(long)]
    once: bool,

    /// Log a status line every N ticks (0 disables)
    #[arg(long, default_value_t = 30)]
    status_every: u64,

    /// Trade against an in-memory random-walk venue instead of the broker
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }
    if let Some(symbol) = &args.symbol {
        settings.symbol = symbol.trim().to_string();
    }
    settings.validate().context("invalid settings")?;

    tracing::info!("🚀 hybridbot starting");
    tracing::info!("  Mode: {}", settings.mode);
    tracing::info!("  Symbol: {}", settings.symbol);
    tracing::info!("  Strategy: {}", settings.strategy.variant);
    tracing::info!("  Tick interval: {:?}", settings.tick_interval());
    tracing::info!("  Request spacing: {:?}", settings.request_interval());

    let venue = create_venue(&settings, args.simulate)?;
    let limiter = match settings.rate_limit.interval_ms {
        Some(_) => RequestLimiter::with_interval(settings.request_interval()),
        None => RequestLimiter::for_mode(settings.mode),
    };

    let strategy = HybridStrategy::new(settings.strategy.clone(), settings.costs);
    let trader = Arc::new(Mutex::new(Trader::new(
        venue,
        Arc::new(limiter),
        Box::new(strategy),
        settings.costs,
        settings.trader_config()?,
    )));

    if args.once {
        let mut trader = trader.lock().await;
        let outcome = trader.run_tick(Local::now().naive_local()).await;
        tracing::info!("Tick outcome: {:?}", outcome);
        println!("{}", serde_json::to_string_pretty(&trader.status())?);
        return Ok(());
    }

    tracing::info!("\nPress Ctrl+C to stop...\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        _ = trading_loop(trader.clone(), &settings, args.status_every, !args.simulate) => {}
    }

    log_summary(&trader.lock().await.status());
    tracing::info!("👋 hybridbot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hybridbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_venue(settings: &Settings, simulate: bool) -> anyhow::Result<Arc<dyn Venue>> {
    if simulate {
        tracing::info!("🧪 Using simulated venue");
        let venue = SimulatedVenue::new(
            settings.symbol.trim(),
            10_000.0,
            10_000_000.0,
            PricePath::random_walk(rand::random(), 0.0, 0.002),
        )
        .with_costs(settings.costs);
        return Ok(Arc::new(venue));
    }

    settings
        .require_credentials()
        .context("live and paper brokers need credentials (or pass --simulate)")?;

    let credentials = KisCredentials {
        app_key: settings.venue.app_key.clone(),
        app_secret: settings.venue.app_secret.clone(),
    };
    let mut client = KisClient::new(credentials, settings.mode)?;
    if let Some(base_url) = &settings.venue.base_url {
        client = client.with_base_url(base_url);
    }
    Ok(Arc::new(client))
}

async fn trading_loop(
    trader: Arc<Mutex<Trader>>,
    settings: &Settings,
    status_every: u64,
    respect_hours: bool,
) {
    let mut ticker = interval_at(Instant::now(), settings.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut tick_count = 0u64;
    let mut in_session = false;

    loop {
        ticker.tick().await;
        let now = Local::now().naive_local();
        let mut trader = trader.lock().await;

        if respect_hours && !trader.is_trading_time(now) {
            if in_session {
                tracing::info!("🌙 Session closed");
                log_summary(&trader.status());
                in_session = false;
            }
            continue;
        }
        in_session = true;

        trader.run_tick(now).await;
        tick_count += 1;

        if status_every > 0 && tick_count % status_every == 0 {
            let status = trader.status();
            tracing::info!(
                symbol = %status.symbol,
                price = status.last_price,
                quantity = status.position.quantity,
                avg_buy_price = status.position.avg_buy_price,
                net_profit_pct = format!("{:.3}", status.net_profit_pct),
                realized = status.profit.total_realized_profit,
                "📊 Status"
            );
        }
    }
}

fn log_summary(status: &TraderStatus) {
    let profit = &status.profit;
    let sign = if profit.balance_change >= 0.0 { "▲" } else { "▼" };

    tracing::info!("==================== 📊 Session summary ====================");
    tracing::info!("  Symbol: {} ({})", status.symbol, status.strategy);
    tracing::info!("  Starting balance: {:.0}", profit.base_balance);
    tracing::info!("  Current balance: {:.0}", profit.last_balance);
    tracing::info!("  Realized profit: {:.0}", profit.total_realized_profit);
    tracing::info!(
        "  Balance change: {}{:.0} ({:.2}%)",
        sign,
        profit.balance_change.abs(),
        profit.balance_change_pct
    );
    tracing::info!(
        "  Trades: {} ({} winning, {:.1}% win rate)",
        profit.trades,
        profit.winning_trades,
        profit.win_rate
    );
    tracing::info!(
        "  Position: {} @ {:.0}",
        status.position.quantity,
        status.position.avg_buy_price
    );
    tracing::info!("============================================================");
}
