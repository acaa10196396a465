use clap::Parser;
use rust_decimal_macros::dec;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use perp_arb_monitor::adapters::sim::sim_pair;
use perp_arb_monitor::{Config, Orchestrator};

#[derive(Debug, Parser)]
#[command(name = "arb-monitor", about = "Cross-venue perpetual-futures arbitrage monitor")]
struct Cli {
    /// Comma-separated list of canonical symbols to watch.
    #[arg(long, default_value = "BTC-USD-PERP,ETH-USD-PERP", value_delimiter = ',')]
    symbols: Vec<String>,

    /// Path to the sampled spread history SQLite database.
    #[arg(long, default_value = "spread_history.db")]
    db_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::default();
    config.exchanges = vec!["sim-a".to_string(), "sim-b".to_string()];
    config.symbols = cli.symbols.clone();
    config.history_db_path = cli.db_path;

    let mut orchestrator = Orchestrator::new(config)?;

    let (sim_a, sim_b) = sim_pair(cli.symbols, dec!(50000));
    orchestrator.register_adapter(sim_a);
    orchestrator.register_adapter(sim_b);

    orchestrator.start().await?;

    tracing::info!("arbitrage monitor running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    orchestrator.shutdown().await;

    Ok(())
}
