//! `client`: the Initiator.
//!
//! ```text
//! client <peer_address> <peer_port> <input_path> <remote_name> [loss_rate]
//! client <peer_address> <peer_port> --chat [loss_rate]
//! ```
//!
//! The loss rate is validated but has no effect on this side.  Set
//! `RUST_LOG` for diagnostics and `RUDP_LOG=1` for the event log.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::BufReader;

use sham::config::Config;
use sham::event_log::EventLog;
use sham::session::{Mode, Outcome, Progress, Session, Transfer};
use sham::simulator::validate_loss_rate;
use sham::socket::Socket;

const EVENT_LOG_FILE: &str = "client_log.txt";

/// Send a file to, or chat with, a SHAM server.
#[derive(Parser, Debug)]
#[command(name = "client", version, about)]
struct Cli {
    /// Server IP address.
    peer_address: IpAddr,
    /// Server UDP port.
    peer_port: u16,
    /// Chat instead of sending a file.
    #[arg(long)]
    chat: bool,
    /// `<input_path> <remote_name> [loss_rate]`, or `[loss_rate]` with --chat.
    #[arg(value_name = "ARGS")]
    rest: Vec<String>,
}

impl Cli {
    fn mode(&self) -> Result<Mode> {
        let (mode, loss) = match (self.chat, self.rest.as_slice()) {
            (true, [loss @ ..]) if loss.len() <= 1 => (Mode::Chat, loss.first()),
            (false, [input, name, loss @ ..]) if loss.len() <= 1 => (
                Mode::FileTransfer(Transfer::Send {
                    input: PathBuf::from(input),
                    remote_name: name.clone(),
                }),
                loss.first(),
            ),
            (true, _) => bail!("usage: client <peer_address> <peer_port> --chat [loss_rate]"),
            (false, _) => bail!(
                "usage: client <peer_address> <peer_port> <input_path> <remote_name> [loss_rate]"
            ),
        };
        if let Some(raw) = loss {
            let rate: f64 = raw
                .parse()
                .with_context(|| format!("invalid loss rate {raw:?}"))?;
            validate_loss_rate(rate)?;
        }
        Ok(mode)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = cli.mode()?;
    if let Mode::FileTransfer(Transfer::Send { input, .. }) = &mode {
        tokio::fs::metadata(input)
            .await
            .with_context(|| format!("cannot read {}", input.display()))?;
    }

    let config = Config::from_env(EVENT_LOG_FILE)?;
    let events = EventLog::open(config.event_log.as_deref());

    let peer = SocketAddr::new(cli.peer_address, cli.peer_port);
    let local: SocketAddr = match peer {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = Socket::bind(local).await.context("binding local socket")?;
    log::info!("Starting client on {}, connecting to {peer}", socket.local_addr);

    let session = Session::initiate(socket, peer, &config, events)
        .await
        .with_context(|| format!("connecting to {peer}"))?;
    println!("Connection established.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let outcome = session
        .run(mode, stdin, &mut stdout, |p| {
            if p == Progress::ChatStarted {
                println!("Entering Chat Mode. Type '/quit' to exit.");
            }
        })
        .await?;

    if let Outcome::Sent(report) = outcome {
        log::info!(
            "sent {} bytes as {:?} in {} unit(s)",
            report.bytes,
            report.remote_name,
            report.units
        );
        println!("File transfer complete.");
    }
    Ok(())
}
