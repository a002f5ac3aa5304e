use anyhow::Context;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use clap::Parser;
use hybridbot::api::{PricePath, RequestLimiter, SimulatedVenue};
use hybridbot::execution::{TickOutcome, Trader, TraderConfig, TradingHours};
use hybridbot::models::{CostModel, OrderBookTop};
use hybridbot::strategy::{HybridStrategy, StrategyParams, StrategyVariant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Replay the trading loop against a seeded random walk
#[derive(Parser, Debug)]
#[command(name = "replay")]
struct Args {
    /// Seed for the price path and order-flow noise
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 5000)]
    ticks: usize,

    #[arg(long, default_value_t = 10_000.0)]
    start_price: f64,

    /// baseline | extended
    #[arg(long, default_value_t = StrategyVariant::Baseline)]
    variant: StrategyVariant,

    /// Simulated seconds between ticks
    #[arg(long, default_value_t = 2)]
    tick_secs: i64,

    /// Print the final status as JSON
    #[arg(long)]
    json: bool,
}

/// Advance a simulated clock, skipping nights and weekends
fn next_session_time(now: NaiveDateTime, step: Duration, hours: &TradingHours) -> NaiveDateTime {
    let next = now + step;
    if hours.contains(next) {
        return next;
    }

    let mut day = next.date();
    if next.time() > hours.open {
        day = day.succ_opt().unwrap_or(day);
    }
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day.succ_opt().unwrap_or(day);
    }
    day.and_time(hours.open)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("hybridbot=warn")
        .init();

    let args = Args::parse();
    let variant = args.variant;

    let params = StrategyParams {
        variant,
        ..StrategyParams::default()
    };
    let costs = CostModel::default();
    let symbol = "000660";

    let venue = Arc::new(
        SimulatedVenue::new(
            symbol,
            args.start_price,
            100_000_000.0,
            PricePath::random_walk(args.seed, 0.00002, 0.0015),
        )
        .with_costs(costs),
    );

    let config = TraderConfig {
        indicators: params.indicator_config(),
        ..TraderConfig::new(symbol, "00000000-01")
    };
    let hours = config.hours;
    let mut trader = Trader::new(
        venue.clone(),
        Arc::new(RequestLimiter::with_interval(std::time::Duration::ZERO)),
        Box::new(HybridStrategy::new(params, costs)),
        costs,
        config,
    );

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              HYBRIDBOT REPLAY                         ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!("  Seed: {}  Ticks: {}  Variant: {}", args.seed, args.ticks, variant);

    // 2024-03-04 is a Monday
    let mut now = NaiveDate::from_ymd_opt(2024, 3, 4)
        .map(|d| d.and_time(hours.open))
        .context("invalid start date")?;
    let step = Duration::seconds(args.tick_secs.max(1));
    let mut noise = StdRng::seed_from_u64(args.seed.wrapping_add(1));

    let (mut buys, mut sells, mut skipped, mut failed) = (0usize, 0usize, 0usize, 0usize);

    for _ in 0..args.ticks {
        if variant == StrategyVariant::Extended {
            venue.set_tick_strength(Some(noise.gen_range(70.0..140.0)));
            venue.set_order_book(Some(OrderBookTop {
                bid_qty: noise.gen_range(100.0..2_000.0),
                ask_qty: noise.gen_range(100.0..2_000.0),
            }));
            venue.set_market_index(Some(350.0 * (1.0 + noise.gen_range(-0.002..0.002))));
        }

        match trader.run_tick(now).await {
            Some(TickOutcome::Bought { .. }) => buys += 1,
            Some(TickOutcome::Sold { .. }) => sells += 1,
            Some(TickOutcome::Skipped) => skipped += 1,
            Some(TickOutcome::Held) => {}
            None => failed += 1,
        }

        now = next_session_time(now, step, &hours);
    }

    let status = trader.status();
    let profit = &status.profit;

    println!("\n📊 Results");
    println!("  Final price:      {:.0}", venue.last_price());
    println!("  Buys / sells:     {} / {}", buys, sells);
    println!("  Skipped / failed: {} / {}", skipped, failed);
    println!("  Realized profit:  {:.0}", profit.total_realized_profit);
    println!("  Win rate:         {:.1}%", profit.win_rate);
    println!(
        "  Balance change:   {:.0} ({:.3}%)",
        profit.balance_change, profit.balance_change_pct
    );
    println!(
        "  Open position:    {} @ {:.0}",
        status.position.quantity, status.position.avg_buy_price
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    }

    Ok(())
}
