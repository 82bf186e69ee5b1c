//! Delegated Content Routing CLI
//!
//! Find providers, announce content and read or write records through a
//! delegate node.

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use delegate_cli::FileConfig;
use delegate_http::{EndpointConfig, HttpDelegate};
use delegate_routing::{DelegatedRouting, RequestOptions};
use delegate_types::{Cid, Identifier, RecordKey};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "delegate")]
#[command(about = "Content routing through a delegate node")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delegate RPC endpoint (e.g., "http://127.0.0.1:5001/api/v0")
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Per-call timeout (e.g., "30s", "2m")
    #[arg(short, long)]
    timeout: Option<humantime::Duration>,

    /// Extra HTTP header sent with every request ("name: value")
    #[arg(long = "header")]
    headers: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the providers of a CID
    FindProviders {
        #[arg(value_parser = Cid::parse_identifier)]
        cid: Cid,

        /// Stop after this many providers
        #[arg(short = 'n', long)]
        num_providers: Option<usize>,
    },

    /// Have the delegate fetch and announce a CID
    Provide {
        #[arg(value_parser = Cid::parse_identifier)]
        cid: Cid,

        /// Announce every block of the DAG
        #[arg(short, long)]
        recursive: bool,
    },

    /// Fetch a record and write it to stdout
    Get { key: String },

    /// Store a record
    Put { key: String, value: String },
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Invalid header {:?}, expected \"name: value\"", raw),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let endpoint: EndpointConfig = match &cli.endpoint {
        Some(url) => url.parse().context("Invalid --endpoint")?,
        None => file.endpoint()?,
    };
    let mut config = file.routing_config()?;
    if let Some(timeout) = cli.timeout {
        config = config.with_default_timeout(*timeout);
    }

    let delegate = HttpDelegate::new(endpoint)?;
    let routing = DelegatedRouting::new(Arc::new(delegate), config)?;
    routing.start();

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let mut options = RequestOptions::default().with_signal(cancel.clone());
    for raw in &cli.headers {
        let (name, value) = parse_header(raw)?;
        options = options.with_header(name, value);
    }

    let outcome = run(&routing, cli.command, options).await;
    routing.stop();
    outcome
}

async fn run(
    routing: &DelegatedRouting,
    command: Commands,
    options: RequestOptions,
) -> anyhow::Result<()> {
    match command {
        Commands::FindProviders { cid, num_providers } => {
            let options = match num_providers {
                Some(n) => options.with_num_providers(n),
                None => options,
            };
            let mut providers = routing.find_providers(cid, options);
            let mut found = 0usize;
            while let Some(provider) = providers.next().await {
                let provider = provider?;
                found += 1;
                let addrs: Vec<_> = provider.multiaddrs.iter().map(|a| a.to_string()).collect();
                println!("{}\t{}", provider.id, addrs.join(","));
                if num_providers.is_some_and(|n| found >= n) {
                    break;
                }
            }
            info!(key = %cid, found, "Provider search finished");
        }

        Commands::Provide { cid, recursive } => {
            routing
                .provide(&cid, options.with_recursive(recursive))
                .await?;
            println!("Provided {}", cid);
        }

        Commands::Get { key } => {
            let result = routing.get_value(&RecordKey::from(key.as_str()), options).await?;
            match std::str::from_utf8(&result.value) {
                Ok(text) => println!("{}", text),
                // Same rendering as non-UTF-8 record keys.
                Err(_) => println!("{}", RecordKey::new(result.value.clone())),
            }
        }

        Commands::Put { key, value } => {
            routing
                .put(&RecordKey::from(key.as_str()), Bytes::from(value), options)
                .await?;
            println!("Stored {}", key);
        }
    }

    Ok(())
}
