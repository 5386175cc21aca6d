// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! relayd: background process that owns the event loop and dispatches chat
//! traffic to the engine. A real Discord gateway connection is an external
//! collaborator this workspace does not implement, so by default `relayd`
//! reads one chat message per line from stdin and answers on a single
//! console conversation — the harness [`ConsoleChatTransport`] already
//! assumes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use relay_adapters::{ChatTransport, ConsoleChatTransport};
use relay_core::config::Config;
use relay_core::conversation::ConversationKey;
use relay_daemon::{dispatch, watch_loop, Daemon};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const JOB_TICK_INTERVAL: Duration = Duration::from_secs(3);
const RESEARCH_TICK_INTERVAL: Duration = Duration::from_secs(30);
const CONSOLE_CHANNEL_ID: &str = "console";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("relayd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("relayd {}", env!("CARGO_PKG_VERSION"));
                println!("Background process that relays chat messages to a coding agent.");
                println!();
                println!("USAGE:");
                println!("    relayd");
                println!();
                println!("Reads one chat message per line from stdin in place of a real");
                println!("chat gateway connection, and replies on stdout.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: relayd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config_path = config_path();
    let config = Config::load(&config_path)?;
    std::fs::create_dir_all(&config.state_dir)?;

    let log_guard = setup_logging(&config.state_dir)?;
    info!("starting relayd");

    let transport: Arc<dyn ChatTransport> = Arc::new(ConsoleChatTransport::new());
    let daemon = Arc::new(Daemon::new(config, transport.clone()));

    let notices = daemon.load_state();
    for notice in notices {
        let text = format!(
            "conversation {} had an agent run stuck {:?} across the restart and was reset to idle",
            notice.conversation_key, notice.status
        );
        let _ = transport.send_message(relay_adapters::OutboundMessage { channel_id: CONSOLE_CHANNEL_ID.to_string(), text }).await;
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JOB_TICK_INTERVAL);
            loop {
                ticker.tick().await;
                watch_loop::tick_jobs(&daemon).await;
            }
        });
    }
    {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RESEARCH_TICK_INTERVAL);
            loop {
                ticker.tick().await;
                watch_loop::tick_research(&daemon).await;
            }
        });
    }

    info!("relayd ready");
    println!("READY");

    let conversation_key = ConversationKey::dm("console").to_string();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        if text.trim().is_empty() {
                            continue;
                        }
                        dispatch::dispatch_message(&daemon, &conversation_key, CONSOLE_CHANNEL_ID, &text).await;
                    }
                    Ok(None) => {
                        info!("stdin closed, shutting down...");
                        break;
                    }
                    Err(err) => {
                        error!(%err, "error reading stdin");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down...");
                break;
            }
        }
    }

    if let Err(err) = daemon.save_state() {
        error!(%err, "failed to persist state on shutdown");
    }
    info!("relayd stopped");
    drop(log_guard);
    Ok(())
}

fn config_path() -> PathBuf {
    std::env::var_os("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.toml"))
}

fn setup_logging(state_dir: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file_appender = tracing_appender::rolling::never(state_dir, "relayd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(non_blocking)).init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
