//! Entry point for `gbn-transfer`.
//!
//! Parses CLI arguments and dispatches into either **serve** or **fetch**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, signal handling, argument parsing, name
//! resolution).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use gbn_transfer::client;
use gbn_transfer::config::TransferConfig;
use gbn_transfer::server::Server;
use gbn_transfer::simulator::SimulatorConfig;

/// Reliable Go-Back-N file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Serve files from a directory.
    Serve {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Directory requested file names are resolved against.
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Consecutive timeouts before a session is abandoned (0 = never).
        #[arg(long, default_value_t = 30)]
        max_retries: u32,
    },
    /// Fetch one file from a server.
    Fetch {
        /// Server address as host:port (e.g. localhost:9000).
        #[arg(short, long)]
        server: String,
        /// Name of the file to request.
        #[arg(short, long)]
        file: String,
        /// Where to write the received file (defaults to the requested name).
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        protocol: ProtocolArgs,
        /// Request re-sends before giving up (0 = never).
        #[arg(long, default_value_t = 20)]
        max_retries: u32,
    },
}

/// Protocol knobs shared by both modes.
#[derive(Args)]
struct ProtocolArgs {
    /// Go-Back-N window size, in packets.
    #[arg(short, long, default_value_t = 1)]
    window: usize,
    /// Simulated probability of losing a received packet.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,
    /// Simulated probability of corrupting a received packet.
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,
    /// Seed for the loss/corruption simulator.
    #[arg(long)]
    seed: Option<u64>,
    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 500)]
    timeout_ms: u64,
    /// Time-wait period in milliseconds.
    #[arg(long, default_value_t = 1520)]
    time_wait_ms: u64,
}

impl ProtocolArgs {
    fn into_config(self, max_retries: u32) -> TransferConfig {
        TransferConfig {
            window_size: self.window,
            retransmit_timeout: Duration::from_millis(self.timeout_ms),
            time_wait: Duration::from_millis(self.time_wait_ms),
            simulator: SimulatorConfig {
                loss_rate: self.loss,
                corrupt_rate: self.corrupt,
                seed: self.seed,
            },
            max_retries: (max_retries > 0).then_some(max_retries),
            ..TransferConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Serve {
            bind,
            root,
            protocol,
            max_retries,
        } => {
            let config = protocol.into_config(max_retries);
            config.validate().context("invalid configuration")?;
            let server = Server::bind(bind, root, config)
                .await
                .with_context(|| format!("cannot serve on {bind}"))?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("cannot listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
            };
            server.serve_until(shutdown).await?;
        }
        Mode::Fetch {
            server,
            file,
            output,
            protocol,
            max_retries,
        } => {
            let config = protocol.into_config(max_retries);
            config.validate().context("invalid configuration")?;
            let addrs = tokio::net::lookup_host(&server)
                .await
                .with_context(|| format!("cannot resolve {server}"))?;
            let addr = client::pick_server_addr(addrs)
                .with_context(|| format!("no address for {server}"))?;
            let output = output.unwrap_or_else(|| PathBuf::from(&file));

            let report = client::fetch(addr, &file, &output, &config)
                .await
                .with_context(|| format!("fetching {file:?} from {addr}"))?;
            log::info!(
                "received {} byte(s) into {} ({} corrupt, {} out-of-order, {} lost)",
                report.bytes_delivered,
                output.display(),
                report.corrupt,
                report.out_of_order,
                report.lost
            );
        }
    }

    Ok(())
}
