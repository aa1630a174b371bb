//! TestCentral peripheral daemon
//!
//! Runs the GATT server against the loopback transport and reads commands
//! from stdin, one per line. Logs go to stderr, command output to stdout.

mod command;
mod logging;

use anyhow::Context;
use clap::Parser;
use command::{Command, HELP};
use std::path::PathBuf;
use std::sync::Arc;
use testcentral::gatt::profile;
use testcentral::{
    GattServer, GattStatus, LoopbackTransport, PeripheralConfig, ServerEvent, WriteKind,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "testcentrald", about = "BLE test peripheral with a heartbeat characteristic")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides the configured level (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Start advertising immediately
    #[arg(long)]
    start: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PeripheralConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PeripheralConfig::default(),
    };
    logging::init_logger(args.log_level.as_deref().unwrap_or(&config.log_level))?;

    let transport = Arc::new(LoopbackTransport::new());
    let server = GattServer::new(transport.clone(), &config)?;
    tokio::spawn(log_events(server.subscribe_events()));

    if args.start {
        server.start().await?;
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = run(&server, &transport, command).await {
            println!("error: {err}");
        }
    }

    server.stop().await?;
    info!("bye");
    Ok(())
}

async fn run(
    server: &GattServer,
    transport: &LoopbackTransport,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Toggle => {
            let starting = server.toggle();
            println!("{} server", if starting { "starting" } else { "stopping" });
        }
        Command::Notify => {
            server.notify_once(profile::MANUAL_NOTIFY_PAYLOAD).await?;
            println!("notified");
        }
        Command::State => {
            let status = server.status().await?;
            println!(
                "{:?} session={:?} subscribers={} notifying={} sent={}",
                status.state,
                status.session,
                status.subscribers,
                status.notifying,
                transport.notifications().len()
            );
        }
        Command::Subscribe(count) => {
            transport.set_subscribers(&profile::NOTIFY_UUID, count)?;
        }
        Command::Read(uuid) => {
            let result = transport.read(&uuid, 0)?;
            match result.status {
                GattStatus::Success => match std::str::from_utf8(&result.data) {
                    Ok(text) if uuid == profile::READ_ONLY_UUID => println!("{text}"),
                    _ => println!("{}", hex::encode(&result.data)),
                },
                status => println!("read failed: {status:?}"),
            }
        }
        Command::Write(uuid, data) => {
            let status = transport.write(&uuid, &data, WriteKind::WithoutResponse)?;
            println!("{status:?}");
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<ServerEvent>) {
    loop {
        match events.recv().await {
            Ok(ServerEvent::StateChanged(state)) => info!(?state, "server state changed"),
            Ok(ServerEvent::StartFailed(err)) => error!(error = %err, "server failed to start"),
            Ok(ServerEvent::StopFailed(err)) => error!(error = %err, "server failed to stop"),
            Err(RecvError::Lagged(missed)) => warn!(missed, "dropped server events"),
            Err(RecvError::Closed) => break,
        }
    }
}
