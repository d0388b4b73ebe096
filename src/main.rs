//! etls command-line tool.
//!
//! ```text
//! etls ciphers [FILTER...]            list suites a filter selects
//! etls probe HOST PORT                connect, print session details as JSON
//! etls echo PORT                      TLS echo server (needs certfile)
//! ```
//!
//! All subcommands accept `--config FILE` (TOML, see `config::schema`).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use etls::boundary;
use etls::config::{load_config, CipherSpec, EtlsConfig};
use etls::engine::{Direction, Engine, Operation, TlsSocket};
use etls::error::EtlsError;
use etls::observability::logging::init_logging;
use etls::tls::{cipher_suites, TlsContext};

#[derive(Parser)]
#[command(name = "etls")]
#[command(about = "Asynchronous TLS socket engine tools", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the cipher suites a filter selects (all suites when empty)
    Ciphers { filter: Vec<String> },
    /// Connect and print the negotiated session as JSON
    Probe {
        host: String,
        port: u16,
        /// Overrides engine.operation_timeout_ms
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Serve a TLS echo endpoint until interrupted
    Echo {
        port: u16,
        #[arg(long)]
        backlog: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EtlsConfig::default(),
    };
    init_logging(&config.observability.log_level)?;

    match cli.command {
        Commands::Ciphers { filter } => list_ciphers(filter),
        Commands::Probe {
            host,
            port,
            timeout_ms,
        } => {
            let limit = timeout_ms.unwrap_or(config.engine.operation_timeout_ms);
            probe(&config, host, port, Duration::from_millis(limit)).await
        }
        Commands::Echo { port, backlog } => {
            let backlog = backlog.unwrap_or(config.engine.listen_backlog);
            echo(&config, port, backlog).await
        }
    }
}

fn list_ciphers(filter: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let names = cipher_suites(&CipherSpec::from(filter))?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

async fn probe(
    config: &EtlsConfig,
    host: String,
    port: u16,
    limit: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::current()?;
    let context = TlsContext::new(&config.tls)?;

    let (completion, pending) = boundary::channel(Operation::Connect);
    engine.connect_async(host.as_str(), port, &context, completion);
    let socket = pending.wait(limit).await?;

    let info = socket.info();
    let report = json!({
        "host": host,
        "port": port,
        "local_address": info.local_addr.map(|addr| addr.to_string()),
        "peer_address": info.peer_addr.map(|addr| addr.to_string()),
        "protocol": info.protocol,
        "cipher_suite": info.cipher_suite,
        "chain": info.chain.subjects(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Err(e) = socket.shutdown(Direction::Write).await {
        tracing::debug!(error = %e, "close_notify not sent");
    }
    socket.close();
    Ok(())
}

async fn echo(config: &EtlsConfig, port: u16, backlog: u32) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::current()?;
    let context = TlsContext::for_listener(&config.tls)?;
    let acceptor = engine.listen(port, &context, backlog)?;
    println!("listening on {}", acceptor.local_address()?);

    loop {
        tokio::select! {
            accepted = acceptor.accept() => match accepted {
                Ok(socket) => {
                    tokio::spawn(serve(socket));
                }
                Err(e) => tracing::warn!(error = %e, "Accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    acceptor.close();
    Ok(())
}

async fn serve(socket: TlsSocket) {
    let peer = socket.peer_address().ok();
    if let Err(e) = socket.handshake().await {
        tracing::warn!(peer = ?peer, error = %e, "Handshake failed");
        return;
    }

    loop {
        match socket.receive(0).await {
            Ok(data) => {
                if let Err(e) = socket.send(data).await {
                    tracing::warn!(peer = ?peer, error = %e, "Echo failed");
                    break;
                }
            }
            Err(EtlsError::EndOfStream) => {
                let _ = socket.shutdown(Direction::Write).await;
                break;
            }
            Err(e) => {
                tracing::warn!(peer = ?peer, error = %e, "Receive failed");
                break;
            }
        }
    }
    socket.close();
}
