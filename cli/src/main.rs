//! Keyhole - covert keystroke channel over TCP header fields
//!
//! The sender turns keystrokes into marked TCP segments aimed at a receiver host;
//! the receiver captures TCP traffic, picks out the marked segments and writes the
//! decoded text to two append-only logs.

mod config;
mod keyboard;
mod menu;
mod net;
mod output;
mod storage;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use protocol::receive::{ReceivePath, ReceiveSummary};
use protocol::session::{parse_host, parse_key};
use protocol::transmit::{TransmitPath, TransmitSummary};
use protocol::{Key, Session, StopToken};
use std::io;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "keyhole")]
#[command(version)]
#[command(about = "Covert keystroke channel hidden in TCP header fields", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive menu (default)
    Menu,

    /// Send keystrokes to the receiver host until Esc
    Send {
        /// Receiver IPv4 address
        #[arg(long)]
        host: Option<String>,

        /// Cipher key, 0 to 25
        #[arg(long)]
        key: Option<String>,
    },

    /// Capture covert packets and log the decoded text until Ctrl-C
    Receive {
        /// Cipher key, 0 to 25
        #[arg(long)]
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::Config::load(path)?,
        None => config::Config::default(),
    };

    // Initialize tracing
    let level = config
        .logging
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(output::ConsoleWriter::stderr)
        .init();

    info!("Keyhole v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let mut session = config.session().context("Invalid session configuration")?;

    match args.command.unwrap_or(Command::Menu) {
        Command::Menu => run_menu(session, &config).await,
        Command::Send { host, key } => {
            if let Some(host) = host {
                session.host = parse_host(&host)?;
            }
            if let Some(key) = key {
                session.key = parse_key(&key)?;
            }
            run_send(session, &config).await.map(|_| ())
        }
        Command::Receive { key } => {
            if let Some(key) = key {
                session.key = parse_key(&key)?;
            }
            run_receive(session.key, &config).await.map(|_| ())
        }
    }
}

async fn run_menu(mut session: Session, config: &config::Config) -> Result<()> {
    loop {
        let answer =
            menu::spawn_prompt(move || menu::Menu::new(io::stdin().lock(), io::stdout(), session));

        // Ctrl-C at the prompt quits; the reader thread ends with the process
        let (next, action) = tokio::select! {
            answer = answer => answer
                .context("Menu thread panicked")?
                .context("Failed to read operator input")?,
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                println!();
                println!("Goodbye.");
                return Ok(());
            }
        };
        session = next;

        match action {
            menu::MenuAction::Send => {
                run_send(session, config).await?;
            }
            menu::MenuAction::Receive => {
                run_receive(session.key, config).await?;
            }
            menu::MenuAction::Quit => {
                println!("Goodbye.");
                return Ok(());
            }
        }
    }
}

async fn run_send(session: Session, config: &config::Config) -> Result<TransmitSummary> {
    let source = config.sender.source_address()?;
    let poll_interval = config.sender.poll_interval();
    let stop = StopToken::new();
    let worker_stop = stop.clone();

    let task = tokio::task::spawn_blocking(move || -> Result<TransmitSummary> {
        let sink = net::RawSender::open(session.host, source)?;
        let keys = keyboard::TerminalKeys::open(worker_stop.clone(), poll_interval)
            .context("Failed to put the terminal into raw mode")?;
        let mut path = TransmitPath::new(session, sink, worker_stop);
        Ok(path.run(keys)?)
    });

    let summary = supervise(task, stop).await?;
    info!(
        "Transmit session ended ({:?}): {} packets sent, {} keys skipped",
        summary.end, summary.sent, summary.skipped
    );
    Ok(summary)
}

async fn run_receive(key: Key, config: &config::Config) -> Result<ReceiveSummary> {
    let options = config.receive_options();
    let poll_interval = config.receiver.poll_interval();
    let encrypted_log = config.receiver.encrypted_log.clone();
    let decrypted_log = config.receiver.decrypted_log.clone();
    let stop = StopToken::new();
    let worker_stop = stop.clone();

    info!("Receiver listening, press Ctrl-C to stop");
    let task = tokio::task::spawn_blocking(move || -> Result<ReceiveSummary> {
        let capture = net::RawCapture::open(poll_interval, worker_stop.clone())?;
        let files = storage::FileLogs::open(&encrypted_log, &decrypted_log)?;
        let logs = output::ConsoleEcho::new(files);
        let mut path = ReceivePath::new(key, logs, options, worker_stop);
        Ok(path.run(capture)?)
    });

    let summary = supervise(task, stop).await?;
    info!(
        "Receive session ended: {} captured, {} covert, {} ignored, {} malformed",
        summary.captured, summary.covert, summary.ignored, summary.malformed
    );
    Ok(summary)
}

/// Wait for a blocking path, cancelling it on Ctrl-C
async fn supervise<T>(mut task: JoinHandle<Result<T>>, stop: StopToken) -> Result<T> {
    tokio::select! {
        joined = &mut task => joined.context("Path task panicked")?,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("Ctrl-C received, stopping");
                    stop.cancel();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
            task.await.context("Path task panicked")?
        }
    }
}
