use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use opsradar::config::{LoggingConfig, RadarConfig};
use opsradar::detect::TickState;
use opsradar::pipeline::Orchestrator;
use opsradar::simulator::Simulator;
use opsradar::storage::memory::MemoryStore;

#[derive(Parser)]
#[command(
    name = "opsradar",
    about = "Streaming anomaly radar for operational metrics and logs",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults: $OPSRADAR_CONFIG, /etc/opsradar/opsradar.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (pipeline loop + API server)
    Serve {
        /// Bind address, overrides api.bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the pipeline offline over simulated traffic on a virtual clock
    Simulate {
        /// Number of ticks to replay
        #[arg(long, default_value = "600")]
        ticks: usize,

        /// Simulator seed, overrides simulator.seed
        #[arg(long)]
        seed: Option<u64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List recent incidents from the database
    Incidents {
        /// Number of incidents to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Database path, overrides storage.db_path
        #[arg(long)]
        db: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<RadarConfig> {
    let mut config = match path {
        Some(path) => RadarConfig::load(path)?,
        None => RadarConfig::load_or_default(),
    };
    config.apply_env_overrides()?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting opsradar daemon");
            opsradar::serve(&config).await?;
        }
        Commands::Simulate { ticks, seed, json } => {
            let store = MemoryStore::default();
            let mut orchestrator = Orchestrator::new(&config, store.clone());
            let mut source = Simulator::new(seed.or(config.simulator.seed));
            let step = chrono::Duration::milliseconds(config.pipeline.sample_interval_ms as i64);

            let outcomes = opsradar::scheduler::replay(
                &mut orchestrator,
                &mut source,
                chrono::Utc::now(),
                step,
                ticks,
            )?;
            let incidents = store.incidents();

            if json {
                println!("{}", serde_json::to_string_pretty(&incidents)?);
            } else {
                let count = |state: TickState| outcomes.iter().filter(|o| o.state == state).count();
                println!("\nopsradar simulation: {} ticks", ticks);
                println!(
                    "warmup {} | normal {} | fired {} | suppressed {}",
                    count(TickState::Warmup),
                    count(TickState::Normal),
                    count(TickState::Fired),
                    count(TickState::Suppressed)
                );
                println!("retrains: {}", orchestrator.detector().retrain_count());
                print_incidents(&incidents);
            }
        }
        Commands::Incidents { limit, db, json } => {
            let path = db.unwrap_or(config.storage.db_path);
            let store = opsradar::storage::SqliteStore::new(opsradar::storage::open_pool(&path)?);
            let incidents = store.recent_incidents(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&incidents)?);
            } else {
                print_incidents(&incidents);
            }
        }
        Commands::ShowConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn print_incidents(incidents: &[opsradar::detect::IncidentDecision]) {
    if incidents.is_empty() {
        println!("No incidents.");
        return;
    }
    println!("\n{:<25} | {:<8} | {:<14} | Cluster", "Time", "Score", "Scenario");
    println!("{:-<25}-|-{:-<8}-|-{:-<14}-|-{:-<30}", "", "", "", "");
    for incident in incidents {
        println!(
            "{:<25} | {:<8.4} | {:<14} | {}",
            incident.ts.to_rfc3339(),
            incident.score,
            incident.scenario,
            incident.top_cluster
        );
        println!("{:<25} |   -> {}", "", incident.summary);
        println!("{:<25} |   -> sample: {}", "", incident.sample_log);
    }
    println!();
}
