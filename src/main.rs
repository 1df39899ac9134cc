//! dinterest - Fixed-Rate Deposit Pool Simulator
//!
//! Run with: cargo run -- simulate
//!
//! Builds a pool from `.env` / TOML configuration, replays the profiling
//! scenario against a simulated money market and reports the outcome.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dinterest::config::{parse_market, Config};
use dinterest::math;
use dinterest::pool::PoolEvent;
use dinterest::scenario::{Scenario, ScenarioParams, ScenarioReport, ScenarioStep};

/// Fixed-rate deposit pool simulator
#[derive(Parser)]
#[command(name = "dinterest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file (defaults to environment / .env)
    #[arg(short, long, global = true, env = "DINTEREST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the deposit -> fund -> early withdraw profiling scenario
    Simulate {
        /// Number of deposits
        #[arg(short, long, default_value_t = 90)]
        deposits: usize,

        /// Deposits per multi_deposit call
        #[arg(short, long, default_value_t = 38)]
        batch_size: usize,

        /// Base deposit size in underlying tokens
        #[arg(short, long, default_value_t = 1.0)]
        amount: f64,

        /// Market growth before the withdrawals (0.05 = +5%)
        #[arg(short, long, default_value_t = 0.05)]
        growth: f64,

        /// Randomize deposit sizes with this seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Override the configured market (compound, aave)
        #[arg(short, long)]
        market: Option<String>,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to this TOML file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🏦 DINTEREST - Fixed-Rate Deposit Pool Simulator").cyan().bold()
    );
    println!(
        "{}",
        style("    Deposits | Deficit Funding | Compound & Aave Markets").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config TOML");
        return Err(e);
    }
    Ok(config)
}

/// Append events to a JSON lines file
fn write_event_log<P: AsRef<Path>>(path: P, events: &[PoolEvent]) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    for event in events {
        writeln!(file, "{}", event.to_json_line()?)?;
    }
    Ok(())
}

fn print_report(report: &ScenarioReport, symbol: &str) {
    let fmt = |v| format!("{:.6} {}", math::to_decimal(v, math::UNDERLYING_DECIMALS), symbol);

    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" ✅ SCENARIO COMPLETE").green().bold());
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!();
    println!("Summary ({} market):", report.market);
    println!("  • Deposits:            {}", report.deposits);
    println!("  • Principal locked:    {}", fmt(report.total_deposited));
    println!("  • Interest promised:   {}", fmt(report.interest_promised));
    println!("  • Deficit funded:      {}", fmt(report.deficit_funded));
    println!("  • Paid to depositors:  {}", fmt(report.paid_to_depositors));
    println!("  • Fees collected:      {}", fmt(report.fees_collected));
    println!(
        "  • Funder credit:       {} ({:+.2}%)",
        fmt(report.funder_credit),
        report.funder_return() * 100.0
    );

    let surplus = if report.surplus_after.is_negative {
        style(format!("{}", report.surplus_after)).red()
    } else {
        style(format!("{}", report.surplus_after)).green()
    };
    println!("  • Surplus after:       {} {}", surplus, symbol);
    println!("  • Events emitted:      {}", report.events);
    println!();
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dinterest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    match cli.command {
        Commands::Config { save } => {
            let config = load_config(cli.config.as_deref())?;
            config.print_summary();
            if let Some(path) = save {
                config.save_to_file(&path)?;
                println!("{} Saved to {}", style("✓").green(), path.display());
            }
        }

        Commands::Simulate {
            deposits,
            batch_size,
            amount,
            growth,
            seed,
            market,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(market) = market {
                config.market = parse_market(&market)?;
            }
            config.print_summary();
            println!();

            let params = ScenarioParams {
                deposits,
                batch_size,
                deposit_amount: amount,
                market_growth: growth,
                seed,
                ..ScenarioParams::default()
            };
            info!(
                "Simulating {} deposits of ~{} {} on {}",
                params.deposits, params.deposit_amount, config.underlying_symbol, config.market
            );

            let progress = ProgressBar::new((params.deposits * 2 + 2) as u64);
            progress.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("█▓░"),
            );

            let started = Instant::now();
            let scenario = Scenario::new(config.clone(), params);
            let (report, events) = scenario.run_with_progress(|step| match step {
                ScenarioStep::Deposited { count } => {
                    progress.set_message("depositing");
                    progress.inc(count as u64);
                }
                ScenarioStep::Funded { funding_id } => {
                    progress.set_message(format!("funding #{}", funding_id));
                    progress.inc(1);
                }
                ScenarioStep::TimeTravel { seconds } => {
                    progress.set_message(format!("+{} days", seconds / 86_400));
                    progress.inc(1);
                }
                ScenarioStep::Withdrawn { count } => {
                    progress.set_message("withdrawing");
                    progress.inc(count as u64);
                }
            })?;
            progress.finish_with_message(format!("done in {:.2?}", started.elapsed()));

            print_report(&report, &config.underlying_symbol);

            if config.event_log {
                write_event_log(&config.event_log_path, &events)?;
                println!(
                    "{} {} events logged to: {}",
                    style("📝").cyan(),
                    events.len(),
                    config.event_log_path
                );
            }
        }
    }

    Ok(())
}
