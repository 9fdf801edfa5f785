use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use relay_reconciler::config::{load_config, validation::validate_config, ConfigError};
use relay_reconciler::engine::SystemEngine;
use relay_reconciler::generate::{self, ArtifactKind};
use relay_reconciler::observability::logging;
use relay_reconciler::store::{ConfigStore, StateFile};
use relay_reconciler::warmup::WarmupScheduler;
use relay_reconciler::{ApplyError, Daemon, Reconciler, ReconcilerConfig};

#[derive(Parser)]
#[command(name = "relay-reconciler")]
#[command(about = "Generates and applies mail relay configuration", long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: apply on start, watch state, advance warmup
    Run,
    /// Apply once and print the result
    Apply,
    /// Print generated artifacts without writing them
    Preview {
        /// Only print this artifact (sources, queues, listener_domains, signing_keys, policy)
        #[arg(short, long)]
        kind: Option<ArtifactKind>,
    },
    /// Run one warmup pass
    Warmup,
    /// Load and validate the configuration
    Check,
    /// Print the DKIM DNS records for every sender with a public key
    DkimRecords,
}

fn load(path: Option<&PathBuf>) -> Result<ReconcilerConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let config = ReconcilerConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Arc::new(load(cli.config.as_ref())?);

    logging::init_logging(&config.observability)?;

    let store: Arc<dyn ConfigStore> = Arc::new(StateFile::new(&config.store.state_file));
    let reconciler = || {
        Arc::new(Reconciler::new(
            config.clone(),
            store.clone(),
            Arc::new(SystemEngine::new(config.engine.clone())),
        ))
    };

    match cli.command {
        Commands::Run => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay-reconciler starting");
            Daemon::from_config(config.clone())?.run().await?;
        }
        Commands::Apply => match reconciler().apply().await {
            Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            Err(e) => return Err(report_failure(e)?),
        },
        Commands::Preview { kind } => {
            for artifact in reconciler().preview()? {
                if kind.is_some_and(|k| k != artifact.kind) {
                    continue;
                }
                println!("# ---- {} ({})", artifact.kind, artifact.path.display());
                print!("{}", artifact.content);
            }
        }
        Commands::Warmup => {
            let scheduler = WarmupScheduler::new(store.clone(), reconciler(), &config.warmup);
            let report = scheduler.run_once(chrono::Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Check => {
            println!("Configuration OK");
            println!("{}", toml::to_string_pretty(config.as_ref())?);
        }
        Commands::DkimRecords => {
            let snapshot = store.load_snapshot()?;
            let records = generate::dns_records(&snapshot, &config.paths.dkim_dir);
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}

/// Print whatever the failed run produced and turn the error into the exit error.
fn report_failure(e: ApplyError) -> Result<Box<dyn std::error::Error>, serde_json::Error> {
    if let Some(result) = e.result() {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    if e.is_critical() {
        eprintln!("CRITICAL: configuration is valid but the engine did not come back up");
    }
    Ok(Box::new(e))
}
