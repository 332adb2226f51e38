//! Gas Tracker - Multi-chain fee monitor
//!
//! Run with: cargo run -- --mode live --amount 0.5
//!
//! - Polls every configured network for fee quotes on its own cadence
//! - Samples the native asset price every 30s
//! - Prints a per-network report and the simulated transaction cost

use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chains;
mod config;
mod gas_oracle;
mod price_feed;
mod simulator;
mod tracker;

use config::{Config, TrackingMode};
use gas_oracle::{FeeQuoteProvider, RpcFeeQuoteProvider};
use price_feed::{PriceFeed, ReferencePriceFeed};
use simulator::{cheapest, SimulationResult};
use tracker::{TrackerSettings, TrackingCoordinator};

/// Multi-chain gas fee tracker and transaction cost simulator
#[derive(Parser, Debug)]
#[command(name = "gas-tracker", version, about)]
struct Cli {
    /// TOML config file (defaults to environment / .env)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial mode: live or simulation
    #[arg(short, long)]
    mode: Option<String>,

    /// Simulated transfer amount, in native units
    #[arg(short, long)]
    amount: Option<f64>,

    /// Stop after this many seconds (0 = run until Ctrl-C)
    #[arg(short, long, default_value_t = 0)]
    duration: u64,

    /// Seconds between reports
    #[arg(long, default_value_t = 30)]
    report_secs: u64,

    /// Switch to simulation mode after this many seconds
    #[arg(long)]
    simulate_after: Option<u64>,

    /// Print reports as JSON
    #[arg(long)]
    json: bool,

    /// Write the effective configuration to this TOML file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" ⛽ GAS TRACKER - Multi-chain Fee Monitor").cyan().bold()
    );
    println!(
        "{}",
        style("    Live fee polling | Fee history | Cost simulation").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(mode) = &cli.mode {
        config.initial_mode = mode.parse()?;
    }

    Ok(config)
}

fn format_trend(trend: Option<f64>) -> String {
    match trend {
        Some(t) if t > 0.0 => style(format!("▲ {:.1}%", t * 100.0)).red().to_string(),
        Some(t) if t < 0.0 => style(format!("▼ {:.1}%", -t * 100.0)).green().to_string(),
        Some(_) => "= 0.0%".to_string(),
        None => "-".to_string(),
    }
}

fn print_report<P, F>(tracker: &TrackingCoordinator<P, F>)
where
    P: FeeQuoteProvider,
    F: ReferencePriceFeed,
{
    let price = tracker.reference_price();

    println!();
    println!(
        "{} {} | {} ${:.2} ({})",
        style("📊").cyan(),
        style(tracker.mode()).bold(),
        style("price").dim(),
        price.value,
        price.source
    );
    if tracker.is_loading() {
        println!("   {}", style("waiting for first quotes...").yellow());
    }

    for network in tracker.networks() {
        let status = if network.connected {
            style("● connected").green()
        } else {
            style("○ offline").red()
        };

        if network.has_sample() {
            println!(
                "   {:<10} {} | base {:>9.4} gwei | tip {:>8.4} gwei | {:>3}/{} pts | {}",
                network.config.display_name,
                status,
                network.latest.base_fee,
                network.latest.priority_fee,
                network.history.len(),
                network.history.capacity(),
                format_trend(network.history.trend())
            );
        } else {
            println!("   {:<10} {} | no data yet", network.config.display_name, status);
        }
    }

    print_simulation(&tracker.request_simulation_recompute(), tracker.notional_amount());
}

fn print_simulation(results: &[SimulationResult], notional: f64) {
    if results.is_empty() {
        return;
    }

    let best = cheapest(results).map(|r| r.network_id.clone());

    println!();
    println!("   {} Sending {} (native units):", style("💸").cyan(), notional);
    for result in results {
        let line = format!(
            "{:<10} gas {:.8} {:<5} ${:>8.4} | total ${:.2}",
            result.display_name,
            result.gas_cost_native,
            result.symbol,
            result.gas_cost_fiat,
            result.total_cost_fiat
        );
        if best.as_deref() == Some(result.network_id.as_str()) {
            println!("   {} {}", style("★").green(), style(line).green().bold());
        } else {
            println!("     {}", line);
        }
    }
}

fn print_json<P, F>(tracker: &TrackingCoordinator<P, F>) -> Result<()>
where
    P: FeeQuoteProvider,
    F: ReferencePriceFeed,
{
    let networks: Vec<_> = tracker
        .networks()
        .into_iter()
        .map(|n| {
            serde_json::json!({
                "id": n.id(),
                "connected": n.connected,
                "latest": n.latest,
                "history": n.history.to_vec(),
            })
        })
        .collect();

    let report = serde_json::json!({
        "mode": tracker.mode(),
        "status": tracker.status(),
        "reference_price": tracker.reference_price(),
        "notional_amount": tracker.notional_amount(),
        "networks": networks,
        "simulation": tracker.simulation_results(),
    });

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gas_tracker=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if !cli.json {
        print_banner();
    }

    // Load configuration
    let config = load_config(&cli)?;

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e);
    }

    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
        info!("💾 Configuration written to {}", path.display());
        return Ok(());
    }

    if !cli.json {
        config.print_summary();
        println!();
    }

    // =============================================
    // WIRING
    // =============================================
    let feed = Arc::new(PriceFeed::from_config(&config)?);
    let provider = Arc::new(RpcFeeQuoteProvider::new());
    let tracker = TrackingCoordinator::new(
        config.networks.clone(),
        provider.clone(),
        feed,
        TrackerSettings::from_config(&config),
    );

    if let Some(amount) = cli.amount {
        if let Err(e) = tracker.set_notional_amount(amount) {
            error!("{}", e);
            return Err(e.into());
        }
    }

    if config.initial_mode == TrackingMode::Live {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
        spinner.set_message(format!("Connecting to {} networks...", config.networks.len()));
        spinner.enable_steady_tick(Duration::from_millis(120));

        tracker.set_mode(TrackingMode::Live).await;
        spinner.finish_and_clear();

        match tracker.last_error() {
            Some(err) => println!("{} {}", style("✗").red(), err),
            None => {
                let connected = tracker.networks().iter().filter(|n| n.connected).count();
                println!(
                    "{} Connected to {}/{} networks",
                    style("✓").green(),
                    connected,
                    config.networks.len()
                );
            }
        }
    } else {
        tracker.set_mode(TrackingMode::Simulation).await;
        tracker.request_simulation_recompute();
    }

    // =============================================
    // REPORT LOOP
    // =============================================
    let mut report = tokio::time::interval(Duration::from_secs(cli.report_secs.max(1)));
    report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let deadline = async {
        match cli.duration {
            0 => std::future::pending::<()>().await,
            secs => tokio::time::sleep(Duration::from_secs(secs)).await,
        }
    };
    tokio::pin!(deadline);

    let switch = async {
        match cli.simulate_after {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(switch);
    let mut switched = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = &mut deadline => {
                info!("⏱  Run duration reached");
                break;
            }
            _ = &mut switch, if !switched => {
                switched = true;
                tracker.set_mode(TrackingMode::Simulation).await;
            }
            _ = report.tick() => {
                if cli.json {
                    if let Err(e) = print_json(&tracker) {
                        warn!("Failed to encode report: {}", e);
                    }
                } else {
                    print_report(&tracker);
                }
            }
        }
    }

    tracker.stop().await;

    // =============================================
    // SUMMARY
    // =============================================
    if cli.json {
        return print_json(&tracker);
    }

    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" ✅ TRACKING STOPPED").green().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!();
    println!("Summary:");
    for network in tracker.networks() {
        println!(
            "  • {}: {} samples, last {:.4} gwei",
            network.config.display_name,
            network.history.len(),
            network.latest.composite_price
        );
    }
    println!("  • Open RPC connections: {}", provider.open_connections());
    if let Some(best) = cheapest(&tracker.simulation_results()) {
        println!(
            "  • Cheapest for {} {}: {} (${:.2})",
            tracker.notional_amount(),
            best.symbol,
            best.display_name,
            best.total_cost_fiat
        );
    }
    println!();

    Ok(())
}
