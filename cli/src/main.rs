// i2p-service: command-line host for the I2P service
//
// Runs the service against the in-process loopback router with a logging
// message bus. Useful for exercising dispatch and configuration without a
// live I2P router.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use i2p_service_core::service::dispatcher::OPERATION_SEND;
use i2p_service_core::{
    Envelope, I2pService, LoggingBus, LoopbackRouter, NetworkPeer, Operation, ServiceStatus,
    StatusObserver, NETWORK_I2P, SERVICE_NAME,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "i2p-service")]
#[command(about = "I2P network service host", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Property overrides, key=value
    #[arg(short = 'D', long = "set", global = true)]
    properties: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service and run until Ctrl-C
    Run,
    /// Dispatch one operation and print the resulting envelope
    Dispatch {
        /// Operation name, e.g. ACTIVE_PEERS_COUNT
        operation: String,
        /// Content fields, name=value (JSON values accepted)
        #[arg(short, long = "field")]
        fields: Vec<String>,
        /// Destination address for SEND
        #[arg(long)]
        to: Option<String>,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Persist a property in the config file
    Set { key: String, value: String },
    /// Print the config file path
    Path,
}

struct PrintStatus;

impl StatusObserver for PrintStatus {
    fn status_changed(&self, status: ServiceStatus) {
        let label = status.to_string();
        let label = match status {
            ServiceStatus::Running => label.green(),
            ServiceStatus::Error => label.red(),
            s if s.is_terminal() => label.dimmed(),
            _ => label.yellow(),
        };
        println!("{} {}", "●".bright_cyan(), label);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Run => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let path = config::config_path(cli.config)?;
    let properties = config::parse_pairs(&cli.properties)?;

    match cli.command {
        Commands::Run => cmd_run(path, properties).await,
        Commands::Dispatch {
            operation,
            fields,
            to,
        } => cmd_dispatch(path, properties, operation, fields, to).await,
        Commands::Config { action } => cmd_config(path, properties, action),
    }
}

fn build_service(path: PathBuf, router: Arc<LoopbackRouter>) -> Arc<I2pService> {
    Arc::new(
        I2pService::new(router, Arc::new(LoggingBus))
            .with_observer(Arc::new(PrintStatus))
            .with_config_file(path),
    )
}

async fn cmd_run(
    path: PathBuf,
    properties: std::collections::HashMap<String, String>,
) -> Result<()> {
    println!("{}", "I2P Service: starting...".bold());
    println!("Config: {}", path.display().to_string().bright_cyan());
    println!();

    let router = Arc::new(LoopbackRouter::new());
    let service = build_service(path, router);
    service
        .try_start(&properties)
        .await
        .context("Failed to start I2P service")?;

    println!();
    println!("Press {} to stop.", "Ctrl-C".bold());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!();
    service.graceful_shutdown().await;
    println!(
        "{} Sessions closed, {} peer(s) known",
        "✓".green(),
        service.peer_count()
    );
    Ok(())
}

async fn cmd_dispatch(
    path: PathBuf,
    properties: std::collections::HashMap<String, String>,
    operation: String,
    fields: Vec<String>,
    to: Option<String>,
) -> Result<()> {
    if operation.parse::<Operation>().is_err() {
        println!(
            "{} {} is not a known operation; it will be dead-lettered.",
            "!".yellow(),
            operation.bright_cyan()
        );
    }

    let router = Arc::new(LoopbackRouter::new());
    let service = build_service(path, router.clone());
    service
        .try_start(&properties)
        .await
        .context("Failed to start I2P service")?;

    let mut envelope = Envelope::for_operation(SERVICE_NAME, &operation);
    for (name, raw) in config::parse_pairs(&fields)? {
        let value = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));
        envelope.add_nvp(&name, value);
    }
    if operation == OPERATION_SEND {
        let Some(address) = to else {
            bail!("SEND needs a destination: --to <address>");
        };
        let fingerprint = router.add_destination(&address).to_hex();
        let destination = NetworkPeer::new(NETWORK_I2P, &address, &fingerprint);
        envelope.add_external_route(
            SERVICE_NAME,
            OPERATION_SEND,
            service.local_peer(),
            Some(destination),
        );
    }

    let handled = service.handle_document(&mut envelope).await;
    service.shutdown().await;

    println!();
    let mark = if handled { "✓".green() } else { "✗".red() };
    println!("{} {}", mark, operation.bold());
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if operation == OPERATION_SEND {
        println!(
            "{} {} packet(s) handed to router",
            "→".bright_cyan(),
            router.sent_packets().len()
        );
    }
    Ok(())
}

fn cmd_config(
    path: PathBuf,
    properties: std::collections::HashMap<String, String>,
    action: Option<ConfigAction>,
) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let effective = config::load(&properties, &path)?;
            println!("{}", "Configuration".bold());
            println!("  file: {}", path.display().to_string().bright_cyan());
            println!("{}", serde_json::to_string_pretty(&effective)?);
        }
        ConfigAction::Set { key, value } => {
            config::set(&path, &key, &value)?;
            // surface values the service would reject at start
            config::load(&properties, &path)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }
        ConfigAction::Path => println!("{}", path.display()),
    }
    Ok(())
}
