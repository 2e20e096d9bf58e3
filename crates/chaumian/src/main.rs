mod cli;

use std::sync::Arc;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Network, Txid};
use clap::Parser;
use eyre::{eyre, WrapErr};
use tokio_util::sync::CancellationToken;

use chaumian_core::transport::{BackendTransport, HttpTransport, HttpTransportConfig};
use chaumian_core::types::UnblindedSignature;
use chaumian_core::version::{CompatibilityWindow, ProtocolVersion, VersionPolicy};
use chaumian_core::{ActiveOutput, BackendClient, OutputRegistrationClient, TxCache, TxNode};

use cli::Command;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();

    let network = map_network(&args.network)?;

    // Shared state is composed here once and handed to every client.
    let transport: Arc<dyn BackendTransport> = Arc::new(
        HttpTransport::new(HttpTransportConfig {
            requests_per_second: args.requests_per_second,
            max_retries: args.max_retries,
            ..HttpTransportConfig::new(args.backend_url.clone())
        })
        .context("configure backend transport")?,
    );
    let cache = Arc::new(TxCache::with_capacity(args.cache_tx_cap).context("configure cache")?);
    let protocol_version = Arc::new(ProtocolVersion::new(args.protocol_version));
    let policy = VersionPolicy {
        window: CompatibilityWindow::new(args.min_backend_version, args.max_backend_version)
            .context("configure backend version window")?,
        ..VersionPolicy::default()
    };

    let backend = BackendClient::new(
        transport.clone(),
        cache,
        protocol_version.clone(),
        policy,
    );
    let outputs = OutputRegistrationClient::new(transport, protocol_version);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling");
                cancel.cancel();
            }
        }
    });

    let negotiate = !args.skip_version_check && !matches!(args.command, Command::Versions);
    if negotiate {
        let status = backend
            .check_updates(&cancel)
            .await
            .wrap_err_with(|| format!("while checking versions at `{}`", args.backend_url))?;
        if !status.backend_compatible {
            return Err(eyre!(
                "backend speaks protocol v{}, this client supports v{}..=v{}",
                status.current_backend_major_version,
                args.min_backend_version,
                args.max_backend_version
            ));
        }
    }

    match args.command {
        Command::Versions => {
            let status = backend.check_updates(&cancel).await?;
            println!("backend protocol version:  {}", status.current_backend_major_version);
            println!("backend compatible:        {}", status.backend_compatible);
            println!("client up to date:         {}", status.client_up_to_date);
            println!("legal documents version:   {}", status.legal_documents_version);
        }
        Command::FetchTxs { txids, hex } => {
            let txids = txids
                .iter()
                .map(|s| s.parse::<Txid>().with_context(|| format!("invalid txid `{s}`")))
                .collect::<eyre::Result<Vec<_>>>()?;
            let ordered = backend
                .get_transactions(&txids, &cancel)
                .await
                .context("fetch transactions")?;
            for node in &ordered {
                print_tx(node, hex);
            }
            tracing::info!(count = ordered.len(), "transactions fetched");
        }
        Command::RegisterOutput {
            round_id,
            address,
            signature,
            level,
        } => {
            let address = address
                .parse::<Address<NetworkUnchecked>>()
                .with_context(|| format!("invalid address `{address}`"))?
                .require_network(network)
                .context("address belongs to a different network")?;
            let signature = UnblindedSignature::from_hex(&signature)?;
            let output = ActiveOutput::new(address, signature, level);

            let outcome = outputs
                .register_output(round_id, &output)
                .await
                .context("register output")?;
            println!("{outcome}");
        }
        Command::Broadcast { hex } => {
            let node = TxNode::from_hex(&hex)?;
            backend.broadcast(&node).await.context("broadcast")?;
            println!("{}", node.txid);
        }
        Command::Mempool { compactness } => match compactness {
            Some(compactness) => {
                for hash in backend.get_mempool_hashes_compact(compactness, &cancel).await? {
                    println!("{hash}");
                }
            }
            None => {
                for txid in backend.get_mempool_hashes(&cancel).await? {
                    println!("{txid}");
                }
            }
        },
    }

    Ok(())
}

fn print_tx(node: &TxNode, with_hex: bool) {
    if with_hex {
        println!("{} {}", node.txid, node.to_hex());
    } else {
        println!("{}", node.txid);
    }
}

fn map_network(name: &str) -> eyre::Result<Network> {
    match name {
        "main" | "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
        "test" | "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        _ => Err(eyre!("unrecognized network `{name}`")),
    }
}
