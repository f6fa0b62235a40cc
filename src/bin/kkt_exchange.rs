//! Send one XML command to a fiscal register and print the answer.
//!
//! ```text
//! kkt-exchange --port COM9 "<GET DEV=''/>"
//! kkt-exchange --host 192.168.1.50 --tcp-port 8200 "<GET VER=''/>"
//! kkt-exchange --profile kkt.json --verbose "<GET DATE=''/>"
//! kkt-exchange --list-ports
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use kkt_link::kkt::encoding;
use kkt_link::{diagnostics, serial, ConnectionConfig, SessionConnection};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "kkt-exchange", version, about = "Exchange one command with a KKT")]
struct Args {
    /// JSON connection profile (connectionType, comName, ipAddress, ...)
    #[arg(long, conflicts_with_all = ["port", "host"])]
    profile: Option<PathBuf>,

    /// Serial port name, e.g. COM9 or /dev/ttyUSB0
    #[arg(long, conflicts_with = "host")]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long, default_value_t = kkt_link::kkt::config::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Register IP address or host name
    #[arg(long)]
    host: Option<String>,

    /// Register TCP port
    #[arg(long, requires = "host")]
    tcp_port: Option<u16>,

    /// Per-operation timeout in milliseconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Fail on response checksum mismatch
    #[arg(long)]
    strict_checksum: bool,

    /// Print the raw traffic to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// XML command, e.g. "<GET DEV=''/>"
    command: Option<String>,
}

fn build_config(args: &Args) -> anyhow::Result<ConnectionConfig> {
    let mut cfg = if let Some(ref path) = args.profile {
        ConnectionConfig::from_file(path)?
    } else if let Some(ref port) = args.port {
        ConnectionConfig::serial(port, args.baud)
    } else if let Some(ref host) = args.host {
        let tcp_port = args.tcp_port.context("--tcp-port is required with --host")?;
        ConnectionConfig::tcp(host, tcp_port)
    } else {
        bail!("one of --profile, --port or --host is required");
    };

    if let Some(timeout) = args.timeout {
        cfg = cfg.with_timeout_ms(timeout);
    }
    if args.strict_checksum {
        cfg = cfg.with_strict_checksum(true);
    }
    if args.verbose {
        cfg = cfg.with_logger(|line| eprintln!("{line}"));
    }
    Ok(cfg)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = diagnostics::init_logging(args.log_dir.as_deref()).map_err(anyhow::Error::msg)?;

    if args.list_ports {
        let ports = serial::list_ports().map_err(anyhow::Error::msg)?;
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    let command = args
        .command
        .clone()
        .context("a command is required unless --list-ports is given")?;
    let config = build_config(&args)?;
    let session = SessionConnection::new(config)?;
    info!("Using {}", session.description());

    session.connect()?;
    let result = session.exchange(&command);
    session.disconnect()?;

    let response = result?;
    println!("{}", encoding::decode_lossy(&response));
    Ok(())
}
