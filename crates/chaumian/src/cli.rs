use clap::{Parser, Subcommand};

/// Command-line participant for Chaumian CoinJoin backends.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Coordinator backend base URL.
    #[arg(long, default_value = "http://127.0.0.1:37127", env = "CHAUMIAN_BACKEND_URL")]
    pub backend_url: String,

    /// Maximum outbound requests per second (unlimited if omitted).
    #[arg(long, env = "CHAUMIAN_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    /// Extra attempts for read requests that fail transiently.
    #[arg(long, default_value = "2", env = "CHAUMIAN_MAX_RETRIES")]
    pub max_retries: u32,

    /// Maximum number of transactions kept in the in-memory cache.
    #[arg(long, default_value = "1000", env = "CHAUMIAN_CACHE_TX_CAP")]
    pub cache_tx_cap: usize,

    /// Backend protocol major version to use until negotiation succeeds.
    #[arg(long, default_value = "3")]
    pub protocol_version: u16,

    /// Lowest backend major version this client accepts.
    #[arg(long, default_value = "3")]
    pub min_backend_version: u16,

    /// Highest backend major version this client accepts.
    #[arg(long, default_value = "4")]
    pub max_backend_version: u16,

    /// Bitcoin network the backend serves (main, test, signet, regtest).
    #[arg(long, default_value = "main", env = "CHAUMIAN_NETWORK")]
    pub network: String,

    /// Skip version negotiation before running the command.
    #[arg(long)]
    pub skip_version_check: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check backend compatibility and whether this client is up to date.
    Versions,

    /// Fetch transactions by id and print them in spend order.
    FetchTxs {
        /// Transaction ids (hex).
        #[arg(required = true)]
        txids: Vec<String>,

        /// Print raw transaction hex next to each id.
        #[arg(long)]
        hex: bool,
    },

    /// Register a mixing output in a round.
    RegisterOutput {
        #[arg(long, allow_negative_numbers = true)]
        round_id: i64,

        /// Destination address.
        #[arg(long)]
        address: String,

        /// Unblinded signature (hex).
        #[arg(long)]
        signature: String,

        /// Mixing level (denomination tier).
        #[arg(long, default_value = "0")]
        level: u32,
    },

    /// Broadcast a raw transaction through the backend.
    Broadcast {
        /// Consensus-serialized transaction (hex).
        hex: String,
    },

    /// List mempool transaction ids known to the backend.
    Mempool {
        /// Truncate ids to this many hex characters (1-64).
        #[arg(long)]
        compactness: Option<u8>,
    },
}
