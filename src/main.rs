//! appsec-rc command line tool.
//!
//! # Architecture Overview
//!
//! ```text
//!   batch files ──▶ LocalClient::publish ──▶ update worker ──▶ Appsec
//!                                                               │
//!                        ┌──────────────────────────────────────┤
//!                        ▼                                      ▼
//!                 ASM_FEATURES                       ASM / ASM_DD / ASM_DATA
//!                 start / stop                 clone → combine → compile
//!                                                               │
//!                                                               ▼
//!                                            StructuralEngine validates,
//!                                            live state swapped atomically
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use appsec_rc::appsec::{worker, Appsec, StructuralEngine};
use appsec_rc::config::load_config;
use appsec_rc::lifecycle::Shutdown;
use appsec_rc::observability::logging;
use appsec_rc::remoteconfig::{parse_updates, Capability, LocalClient, RemoteConfigClient};
use appsec_rc::rules::{merge_data_entries, RulesFragment};

#[derive(Parser)]
#[command(name = "appsec-rc")]
#[command(about = "Apply remote config security rules deliveries offline", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply delivery files in order and print statuses and final rules
    Replay {
        /// Delivery files: {"PRODUCT": {"path": payload | null}}
        #[arg(required = true)]
        batches: Vec<PathBuf>,
    },
    /// Merge the rules data of several documents
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Start protections with the loaded config and list the advertised
    /// capabilities with their wire bit and the resulting mask
    Capabilities,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    logging::init(&config.observability.log_level);

    match cli.command {
        Commands::Replay { batches } => {
            let client = Arc::new(LocalClient::new());
            let transport: Option<Arc<dyn RemoteConfigClient>> = if config.remote_config.enabled {
                let client: Arc<dyn RemoteConfigClient> = client.clone();
                Some(client)
            } else {
                None
            };

            let (sender, deliveries) = worker::channel(config.remote_config.channel_capacity);
            let appsec = Arc::new(Appsec::new(
                config.appsec.clone(),
                Arc::new(StructuralEngine::new()),
                transport,
                sender,
            )?);

            let shutdown = Shutdown::new();
            let handle = worker::spawn(appsec.clone(), deliveries, shutdown.subscribe());
            appsec.launch()?;

            for path in &batches {
                let updates = parse_updates(&std::fs::read(path)?)?;
                let statuses = client.publish(&updates).await?;
                let state = appsec.snapshot();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "batch": path.display().to_string(),
                        "running": state.is_running(),
                        "generation": state.generation,
                        "statuses": statuses,
                    }))?
                );
            }

            let state = appsec.snapshot();
            println!("{}", serde_json::to_string_pretty(state.compiled.rules())?);

            shutdown.trigger();
            handle.await?;
        }
        Commands::Merge { files } => {
            let mut merged = RulesFragment::default();
            for path in &files {
                let doc = read_fragment(path)?;
                merged.rules_data = merge_data_entries(&merged.rules_data, &doc.rules_data);
                merged.exclusion_data = merge_data_entries(&merged.exclusion_data, &doc.exclusion_data);
            }
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
        Commands::Capabilities => {
            let client = Arc::new(LocalClient::new());
            let transport: Arc<dyn RemoteConfigClient> = client.clone();
            let (sender, _deliveries) = worker::channel(1);
            let appsec = Appsec::new(
                config.appsec.clone(),
                Arc::new(StructuralEngine::new()),
                Some(transport),
                sender,
            )?;
            appsec.enable_activation()?;
            appsec.start()?;

            for capability in Capability::ALL {
                let mark = if client.has_capability(capability) { '+' } else { ' ' };
                println!("{} {:>2} {}", mark, capability.bit(), capability);
            }
            println!(
                "{} advertised, mask {:#x}, products {:?}",
                client.capabilities().len(),
                client.capabilities_mask(),
                client.products()
            );
        }
    }

    Ok(())
}

fn read_fragment(path: &Path) -> Result<RulesFragment, Box<dyn std::error::Error>> {
    let raw = std::fs::read(path)?;
    Ok(RulesFragment::from_slice(&raw)?)
}
