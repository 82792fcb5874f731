//! Command line entry point.
//!
//! A thin host layer over the library: logs in, lists the device directory,
//! watches realtime attribute changes, and sends toggle/brightness commands.

use clap::{Parser, Subcommand, ValueEnum};
use sengled_bridge::observability::init_default_logging;
use sengled_bridge::{BridgeConfig, SengledClient};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sengled-bridge")]
#[command(about = "Cloud bridge for Sengled Wi-Fi LED bulbs")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SENGLED_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the device directory
    Devices {
        /// Force a refresh from the backend instead of serving the cache
        #[arg(long)]
        refresh: bool,
    },
    /// Stay connected and print realtime attribute changes
    Watch,
    /// Switch a bulb on or off
    Toggle {
        /// Device identifier (see `devices`)
        device: String,
        state: SwitchState,
    },
    /// Set a bulb's brightness (0-100)
    Brightness {
        /// Device identifier (see `devices`)
        device: String,
        level: i64,
    },
    /// Validate configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SwitchState {
    On,
    Off,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {err}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Devices { refresh } => run_devices(config, refresh).await,
        Commands::Watch => run_watch(config).await,
        Commands::Toggle { device, state } => {
            run_toggle(config, &device, matches!(state, SwitchState::On)).await
        }
        Commands::Brightness { device, level } => run_brightness(config, &device, level).await,
        Commands::Config { show } => run_config(config, show),
    };

    if let Err(err) = result {
        error!("command failed: {err}");
        process::exit(1);
    }
}

fn load_configuration(path: &Option<PathBuf>) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        info!("loading configuration from {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for candidate in ["bridge.toml", "config/bridge.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("loading configuration from {}", path.display());
            return Ok(BridgeConfig::load_from_file(&path)?);
        }
    }

    Err("no configuration file found; pass one with -c/--config or create bridge.toml".into())
}

async fn logged_in_client(config: &BridgeConfig) -> Result<SengledClient, Box<dyn std::error::Error>> {
    let client = SengledClient::new(config)?;
    if !client.login().await {
        return Err("login failed; check credentials and connectivity".into());
    }
    Ok(client)
}

async fn run_devices(
    config: BridgeConfig,
    refresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = logged_in_client(&config).await?;

    let devices = client.devices(refresh).await;
    if devices.is_empty() {
        println!("no devices registered to this account");
    }
    for bulb in devices {
        println!(
            "{}  {:<20} {:<12} on={} brightness={} online={}",
            bulb.uuid(),
            bulb.name(),
            bulb.type_code(),
            bulb.on(),
            bulb.brightness(),
            bulb.online(),
        );
    }

    client.shutdown().await;
    Ok(())
}

async fn run_watch(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = logged_in_client(&config).await?;

    let found = client
        .scan(|bulb| {
            let uuid = bulb.uuid().to_string();
            println!("watching {} ({})", uuid, bulb.name());
            bulb.set_observer(Box::new(move |name, value| {
                println!("{uuid}: {name} = {value:?}");
            }));
        })
        .await;
    info!("watching {found} devices, press ctrl-c to stop");

    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    client.cancel_scan();
    client.shutdown().await;
    Ok(())
}

async fn run_toggle(
    config: BridgeConfig,
    device: &str,
    on: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = logged_in_client(&config).await?;

    let bulb = client
        .device(device)
        .await
        .ok_or_else(|| format!("no device with id {device}"))?;
    let delivered = bulb.toggle(on).await;
    client.shutdown().await;

    if !delivered {
        return Err("command was not confirmed by the broker".into());
    }
    println!("{} switched {}", device, if on { "on" } else { "off" });
    Ok(())
}

async fn run_brightness(
    config: BridgeConfig,
    device: &str,
    level: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = logged_in_client(&config).await?;

    let bulb = client
        .device(device)
        .await
        .ok_or_else(|| format!("no device with id {device}"))?;
    let delivered = bulb.set_brightness(level).await;
    client.shutdown().await;

    if !delivered {
        return Err("command was not confirmed by the broker".into());
    }
    println!("{device} brightness set");
    Ok(())
}

fn run_config(config: BridgeConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    info!("configuration is valid");
    Ok(())
}
