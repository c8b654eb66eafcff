//! `server`: the Responder.
//!
//! ```text
//! server <port> [--chat] [loss_rate]
//! ```
//!
//! Accepts one client, then stores its file in the current directory or
//! chats with it.  `loss_rate` drops incoming file data units with that
//! probability and has no effect in chat mode.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;

use sham::config::Config;
use sham::event_log::EventLog;
use sham::session::{Mode, Outcome, Progress, Session, Transfer};
use sham::simulator::{validate_loss_rate, LossSimulator};
use sham::socket::Socket;

const EVENT_LOG_FILE: &str = "server_log.txt";

/// Receive a file from, or chat with, one SHAM client.
#[derive(Parser, Debug)]
#[command(name = "server", version, about)]
struct Cli {
    /// UDP port to listen on.
    port: u16,
    /// Chat instead of receiving a file.
    #[arg(long)]
    chat: bool,
    /// Probability in [0, 1] of dropping each incoming data unit.
    #[arg(value_parser = parse_loss_rate)]
    loss_rate: Option<f64>,
}

fn parse_loss_rate(raw: &str) -> Result<f64, String> {
    let rate: f64 = raw.parse().map_err(|_| format!("not a number: {raw}"))?;
    validate_loss_rate(rate).map_err(|e| e.to_string())
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
    let config = Config::from_env(EVENT_LOG_FILE)?;
    let events = EventLog::open(config.event_log.as_deref());

    let mode = if cli.chat {
        Mode::Chat
    } else {
        Mode::FileTransfer(Transfer::Receive {
            output_dir: PathBuf::from("."),
            loss: LossSimulator::new(cli.loss_rate.unwrap_or(0.0))?,
        })
    };

    let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, cli.port));
    let socket = Socket::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    log::info!("Starting server on {bind}");

    let session = Session::respond(socket, &config, events)
        .await
        .context("accepting connection")?;
    println!("Connection established with {}", session.peer());

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let outcome = session
        .run(mode, stdin, &mut stdout, |p| match p {
            Progress::ReceivingFile(name) => {
                println!("Receiving file, will be saved as: {name}")
            }
            Progress::ChatStarted => println!("Entering Chat Mode. Type '/quit' to exit."),
        })
        .await?;

    if let Outcome::Received(file) = outcome {
        log::info!("stored {} bytes at {}", file.bytes, file.path.display());
        println!("File transfer complete.");
        println!("MD5: {}", file.digest.md5);
        println!("SHA-256: {}", file.digest.sha256);
    }
    Ok(())
}
