//! Domain types shared by the backend client and the round clients.
//!
//! Contains the normalized transaction wrapper (`TxNode`), the participant
//! output submitted during output registration (`ActiveOutput`), and the
//! tagged registration result (`RegistrationOutcome`).

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use bitcoin::consensus::encode;
use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::{Address, BlockHash, Transaction, Txid};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ==============================================================================
// Transactions
// ==============================================================================

/// A transaction together with its precomputed id.
///
/// `txid` is computed once when the node is built from a raw transaction, so
/// cache lookups and graph ordering never rehash the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxNode {
    pub txid: Txid,
    pub tx: Transaction,
}

impl TxNode {
    /// Wrap a decoded transaction, establishing its id.
    pub fn from_transaction(tx: Transaction) -> Self {
        Self {
            txid: tx.compute_txid(),
            tx,
        }
    }

    /// Decode a consensus-serialized transaction from hex.
    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        let tx: Transaction = encode::deserialize_hex(hex.trim())
            .map_err(|e| CoreError::InvalidTxData(format!("invalid transaction hex: {e}")))?;
        Ok(Self::from_transaction(tx))
    }

    pub fn to_hex(&self) -> String {
        encode::serialize_hex(&self.tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.tx.is_coinbase()
    }

    /// Ids of the transactions this one spends from, deduplicated and in
    /// input order. Coinbase transactions have no dependencies.
    pub fn dependencies(&self) -> Vec<Txid> {
        if self.is_coinbase() {
            return Vec::new();
        }

        let mut seen = HashSet::with_capacity(self.tx.input.len());
        self.tx
            .input
            .iter()
            .map(|input| input.previous_output.txid)
            .filter(|txid| seen.insert(*txid))
            .collect()
    }
}

// ==============================================================================
// Output Registration
// ==============================================================================

/// Identifier of a mixing round as assigned by the coordinator.
pub type RoundId = i64;

/// Blind signature over the output, unblinded by the participant.
///
/// Serialized as lowercase hex on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnblindedSignature(Vec<u8>);

impl UnblindedSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        Vec::<u8>::from_hex(hex.trim())
            .map(Self)
            .map_err(|e| CoreError::Precondition(format!("invalid unblinded signature hex: {e}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.as_slice().to_lower_hex_string()
    }
}

/// A participant's mixing output, ready to be registered in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOutput {
    pub address: Address,
    pub signature: UnblindedSignature,
    /// Denomination tier selecting the output pool.
    pub mixing_level: u32,
}

impl ActiveOutput {
    pub fn new(address: Address, signature: UnblindedSignature, mixing_level: u32) -> Self {
        Self {
            address,
            signature,
            mixing_level,
        }
    }
}

/// Result of submitting an output to a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// The round was still in output registration and took the output.
    Accepted,
    /// The round already left output registration; nothing was registered.
    PhaseAdvanced,
}

impl RegistrationOutcome {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

impl std::fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::PhaseAdvanced => write!(f, "phase-advanced"),
        }
    }
}

// ==============================================================================
// Off-chain Data
// ==============================================================================

/// A fiat exchange rate as published by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Rate")]
    pub rate: f64,
}

// ==============================================================================
// Block filters and synchronization
// ==============================================================================

/// One compact block filter with the header fields needed to chain it.
///
/// Travels as a colon-separated line:
/// `height:block_hash:filter_hex:prev_block_hash:block_time`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct BlockFilter {
    pub height: u32,
    pub block_hash: BlockHash,
    pub filter: Vec<u8>,
    pub prev_block_hash: BlockHash,
    /// Unix seconds.
    pub block_time: u64,
}

impl FromStr for BlockFilter {
    type Err = CoreError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let bad = |what: &str| CoreError::InvalidResponse(format!("filter line `{line}`: {what}"));

        let parts: Vec<&str> = line.split(':').collect();
        let [height, block_hash, filter, prev_block_hash, block_time] = parts.as_slice() else {
            return Err(bad("expected 5 fields"));
        };

        Ok(Self {
            height: height.parse().map_err(|_| bad("height"))?,
            block_hash: block_hash.parse().map_err(|_| bad("block hash"))?,
            filter: Vec::from_hex(filter).map_err(|_| bad("filter hex"))?,
            prev_block_hash: prev_block_hash.parse().map_err(|_| bad("previous block hash"))?,
            block_time: block_time.parse().map_err(|_| bad("block time"))?,
        })
    }
}

impl TryFrom<String> for BlockFilter {
    type Error = CoreError;

    fn try_from(line: String) -> Result<Self, Self::Error> {
        line.parse()
    }
}

/// Filters following the caller's best known block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FiltersResponse {
    #[serde(rename = "BestHeight")]
    pub best_height: u32,
    #[serde(rename = "Filters", default)]
    pub filters: Vec<BlockFilter>,
}

/// Fee estimation mode forwarded to the backend's node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeEstimateMode {
    Conservative,
    Economical,
}

impl fmt::Display for FeeEstimateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Conservative => "Conservative",
            Self::Economical => "Economical",
        })
    }
}

/// Fee rates (sat/vB) keyed by confirmation target in blocks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeeEstimates {
    #[serde(rename = "Type")]
    pub mode: FeeEstimateMode,
    #[serde(rename = "IsAccurate")]
    pub is_accurate: bool,
    #[serde(rename = "Estimations")]
    pub estimations: BTreeMap<u16, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FiltersResponseState {
    NewFilters,
    NoNewFilter,
    /// The caller's best known block was reorged away; it must rewind.
    BestKnownHashNotFound,
}

/// Combined wallet synchronization payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SynchronizeResponse {
    #[serde(rename = "FiltersResponseState")]
    pub filters_response_state: FiltersResponseState,
    #[serde(rename = "Filters", default)]
    pub filters: Vec<BlockFilter>,
    #[serde(rename = "BestHeight")]
    pub best_height: u32,
    /// Round states are passed through undecoded.
    #[serde(rename = "CcjRoundStates", default)]
    pub round_states: Vec<serde_json::Value>,
    #[serde(rename = "AllFeeEstimate", default)]
    pub fee_estimates: Option<FeeEstimates>,
}
