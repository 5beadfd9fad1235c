//! ut2query - Unreal Engine 2 server browser
//!
//! ```text
//! ut2query [CONFIG]             list the principal server, query every server
//! ut2query server HOST:PORT [CONFIG]   query one server's query port
//! ```
//!
//! Results go to stdout as one JSON object per line; logs go to stderr.

use anyhow::{bail, Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ut2query_config::{ClientConfig, TransportKind};
use ut2query_core::{DirectoryEntry, ServerStatus, PROJECT_NAME, VERSION};
use ut2query_network::{DirectoryQuery, ServerQuery, SessionConfig, TcpTransport, Transport, UdpTransport};
use ut2query_protocol::TextMode;

const DEFAULT_CONFIG_PATH: &str = "ut2query.txt";

fn print_usage() {
    eprintln!("{} {}", PROJECT_NAME, VERSION);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  ut2query [CONFIG]                    list and query every server");
    eprintln!("  ut2query server HOST:PORT [CONFIG]   query a single server");
    eprintln!();
    eprintln!("CONFIG defaults to ./{} when present.", DEFAULT_CONFIG_PATH);
}

/// Load an explicit config strictly, the default path leniently
fn load_config(path: Option<&str>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => ClientConfig::load_or_default(DEFAULT_CONFIG_PATH),
    };

    config.validate().context("Invalid configuration")?;
    config.display();
    Ok(config)
}

fn list_with<T: Transport>(config: &ClientConfig) -> ut2query_core::Result<Vec<DirectoryEntry>> {
    let mut query = DirectoryQuery::<T>::open(
        &config.principal_host,
        config.principal_port,
        config.identity(),
        config.session_config(),
    )?
    .with_filters(config.filters.clone());

    query.list_servers()
}

fn list_servers(config: &ClientConfig) -> ut2query_core::Result<Vec<DirectoryEntry>> {
    match config.transport {
        TransportKind::Udp => list_with::<UdpTransport>(config),
        TransportKind::Tcp => list_with::<TcpTransport>(config),
    }
}

fn query_status(
    host: &str,
    port: u16,
    session: SessionConfig,
    text_mode: TextMode,
) -> ut2query_core::Result<ServerStatus> {
    ServerQuery::<UdpTransport>::open(host, port, session)?
        .with_text_mode(text_mode)
        .status()
}

/// List the principal server and query every entry, `workers` at a time
async fn scan(config: ClientConfig) -> Result<()> {
    let entries = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || list_servers(&config))
            .await?
            .context("Server list request failed")?
    };

    if entries.is_empty() {
        info!("Principal server returned no servers");
        return Ok(());
    }

    info!(
        "Querying {} servers with {} workers",
        entries.len(),
        config.workers
    );

    let semaphore = Arc::new(Semaphore::new(config.workers));
    let mut tasks = JoinSet::new();

    for entry in entries {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let session = config.session_config();
        let text_mode = config.text_mode();

        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = query_status(&entry.address, entry.query_port, session, text_mode);
            (entry, result)
        });
    }

    let mut answered = 0usize;
    let mut skipped = 0usize;

    while let Some(joined) = tasks.join_next().await {
        let (entry, result) = joined?;
        match result {
            Ok(status) => {
                println!("{}", json!({ "server": entry, "status": status }));
                answered += 1;
            }
            Err(e) => {
                warn!("Skipping {}:{}: {}", entry.address, entry.query_port, e);
                skipped += 1;
            }
        }
    }

    info!("Done: {} answered, {} skipped", answered, skipped);
    Ok(())
}

async fn query_one(config: ClientConfig, target: &str) -> Result<()> {
    let Some((host, port)) = target.rsplit_once(':') else {
        bail!("Expected HOST:PORT, got {:?}", target);
    };
    let port: u16 = port
        .parse()
        .with_context(|| format!("Invalid port in {:?}", target))?;
    let host = host.to_string();

    let session = config.session_config();
    let text_mode = config.text_mode();
    let status = {
        let remote = host.clone();
        tokio::task::spawn_blocking(move || query_status(&remote, port, session, text_mode))
            .await?
            .with_context(|| format!("Query to {}:{} failed", host, port))?
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "server": { "address": host, "query_port": port }, "status": status }))?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs on stderr, results on stdout
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("-h") | Some("--help") => {
            print_usage();
            Ok(())
        }
        Some("server") => {
            let Some(target) = args.get(1) else {
                print_usage();
                bail!("Missing HOST:PORT");
            };
            let config = load_config(args.get(2).map(String::as_str))?;
            query_one(config, target).await
        }
        path => {
            info!("{} {} starting", PROJECT_NAME, VERSION);
            let config = load_config(path)?;
            scan(config).await
        }
    }
}
