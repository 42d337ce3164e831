use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use port_session::options::{
    BAUD_RATES, DATA_BITS, DISPLAY_MODES, FLOW_CONTROL, PARITY, SEND_MODES, STOP_BITS,
};
use port_session::{
    BaudRate, ConnectionRegistry, DataBits, DisplayMode, FlowControl, OptionEntry, Parity,
    PortSettings, SendMode, StopBits,
};

mod config;
mod monitor;

use crate::config::Settings;
use crate::monitor::MonitorOptions;

#[derive(Parser)]
#[command(name = "uniterm")]
#[command(about = "Terminal for serial ports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to <config dir>/uniterm/uniterm.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fallback log filter when RUST_LOG is not set (e.g. debug)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports present on this machine
    Ports(PortsArgs),

    /// Show every selectable port and display option
    Options,

    /// Open a port and bridge it to stdin/stdout
    Monitor(MonitorArgs),
}

#[derive(Parser)]
struct PortsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct MonitorArgs {
    /// Port name (such as COM3 or /dev/ttyUSB0)
    port: String,

    #[arg(short, long, default_value = "9600")]
    baud: u32,

    #[arg(long, default_value = "eight")]
    data_bits: DataBits,

    #[arg(long, default_value = "none")]
    parity: Parity,

    #[arg(long, default_value = "one")]
    stop_bits: StopBits,

    #[arg(long, default_value = "none")]
    flow_control: FlowControl,

    /// How received bytes are shown (overrides the config file)
    #[arg(long)]
    display_mode: Option<DisplayMode>,

    /// How typed lines are encoded (overrides the config file)
    #[arg(long)]
    send_mode: Option<SendMode>,

    /// Append a carriage return to every line sent
    #[arg(long)]
    cr: bool,

    /// Append a line feed to every line sent
    #[arg(long)]
    lf: bool,

    /// Receive buffer size in characters (overrides the config file)
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Append received data to this file
    #[arg(long)]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.log_level);
    let default_directive = format!(
        "uniterm={level},port_session={level},serial_backend={level},warn"
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    match cli.command {
        Commands::Ports(args) => ports_command(args.json),
        Commands::Options => {
            options_command();
            Ok(())
        }
        Commands::Monitor(args) => monitor_command(args, settings).await,
    }
}

fn ports_command(json: bool) -> Result<()> {
    let ports = serial_backend::list_ports().context("Failed to enumerate serial ports")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
    } else if ports.is_empty() {
        println!("No serial ports found");
    } else {
        for port in &ports {
            println!("{}", port);
        }
    }
    Ok(())
}

fn print_table<T: std::fmt::Display>(title: &str, entries: &[OptionEntry<T>]) {
    println!("{}:", title);
    for entry in entries {
        println!("  {:>2}  {:<12} {}", entry.id, entry.label, entry.value);
    }
}

fn options_command() {
    print_table("Baud rates", &BAUD_RATES);
    print_table("Flow control", &FLOW_CONTROL);
    print_table("Data bits", &DATA_BITS);
    print_table("Parity", &PARITY);
    print_table("Stop bits", &STOP_BITS);
    print_table("Display modes", &DISPLAY_MODES);
    print_table("Send modes", &SEND_MODES);
}

async fn monitor_command(args: MonitorArgs, settings: Settings) -> Result<()> {
    let baud_rate = BaudRate::try_from(args.baud)?;

    let mut defaults = settings.defaults;
    if let Some(mode) = args.display_mode {
        defaults.display_mode = mode;
    }
    if let Some(max_bytes) = args.max_bytes {
        defaults.max_bytes = max_bytes;
    }
    if defaults.max_bytes == 0 {
        anyhow::bail!("--max-bytes must be greater than zero");
    }

    let options = MonitorOptions {
        port: PortSettings {
            name: args.port,
            baud_rate,
            flow_control: args.flow_control,
            data_bits: args.data_bits,
            parity: args.parity,
            stop_bits: args.stop_bits,
        },
        send_mode: args.send_mode.unwrap_or(settings.send_mode),
        append_cr: args.cr || settings.append_cr,
        append_lf: args.lf || settings.append_lf,
        log_path: args.log.map(|p| p.display().to_string()),
    };
    info!("Monitoring {}", options.port.name);

    monitor::run(options, ConnectionRegistry::with_defaults(defaults)).await
}
