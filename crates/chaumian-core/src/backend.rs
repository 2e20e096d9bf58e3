//! Client for the coordinator backend's blockchain, software, and legal
//! document endpoints.
//!
//! [`BackendClient`] owns no global state: the transaction cache and the
//! active protocol version are injected at construction so that several
//! clients (and the round clients in [`crate::coinjoin`]) can share them.

use std::collections::BTreeSet;
use std::sync::Arc;

use bitcoin::{BlockHash, Txid};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::TxCache;
use crate::error::CoreError;
use crate::graph::order_by_dependency;
use crate::transport::{BackendRequest, BackendTransport};
use crate::types::{ExchangeRate, FeeEstimateMode, FiltersResponse, SynchronizeResponse, TxNode};
use crate::version::{
    ProtocolVersion, UpdateStatus, VersionPolicy, VersionReport, VersionsResponse,
};

/// Number of transaction ids requested per backend call.
pub const TX_FETCH_CHUNK_SIZE: usize = 10;

/// Longest txid prefix the compact mempool endpoint accepts, in hex chars.
const MAX_MEMPOOL_COMPACTNESS: u8 = 64;

pub struct BackendClient {
    transport: Arc<dyn BackendTransport>,
    cache: Arc<TxCache>,
    protocol_version: Arc<ProtocolVersion>,
    policy: VersionPolicy,
}

impl BackendClient {
    pub fn new(
        transport: Arc<dyn BackendTransport>,
        cache: Arc<TxCache>,
        protocol_version: Arc<ProtocolVersion>,
        policy: VersionPolicy,
    ) -> Self {
        Self {
            transport,
            cache,
            protocol_version,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<TxCache> {
        &self.cache
    }

    pub fn protocol_version(&self) -> &Arc<ProtocolVersion> {
        &self.protocol_version
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Fetch transactions by id, ordered so that every transaction comes after
    /// the ones it spends from.
    ///
    /// Cached transactions are served locally. Misses are requested in chunks
    /// of [`TX_FETCH_CHUNK_SIZE`], in the order given, and each chunk is added
    /// to the cache as soon as it is decoded. `cancel` is checked before every
    /// chunk; a chunk already in flight is allowed to finish.
    pub async fn get_transactions(
        &self,
        txids: &[Txid],
        cancel: &CancellationToken,
    ) -> Result<Vec<TxNode>, CoreError> {
        let lookup = self.cache.lookup(txids).await;
        debug!(
            requested = txids.len(),
            cached = lookup.hits.len(),
            missing = lookup.misses.len(),
            "transaction lookup"
        );

        let mut all = lookup.hits;
        all.reserve(lookup.misses.len());

        for chunk in lookup.misses.chunks(TX_FETCH_CHUNK_SIZE) {
            if cancel.is_cancelled() {
                debug!(fetched = all.len(), "transaction fetch cancelled");
                return Err(CoreError::Cancelled);
            }

            let fetched = self.fetch_chunk(chunk).await?;
            if fetched.len() != chunk.len() {
                warn!(
                    requested = chunk.len(),
                    returned = fetched.len(),
                    "backend returned a different number of transactions than requested"
                );
            }

            self.cache.insert(fetched.iter().cloned()).await;
            all.extend(fetched);
        }

        order_by_dependency(all)
    }

    async fn fetch_chunk(&self, chunk: &[Txid]) -> Result<Vec<TxNode>, CoreError> {
        let query = chunk
            .iter()
            .map(|txid| format!("transactionIds={txid}"))
            .collect::<Vec<_>>()
            .join("&");
        let path = format!(
            "{}/btc/blockchain/transaction-hexes?{query}",
            self.protocol_version.api_prefix()
        );

        let hexes: Vec<String> = self
            .transport
            .send_and_retry(BackendRequest::get(path))
            .await?
            .expect_status(StatusCode::OK)?
            .json()?;

        hexes.iter().map(|hex| TxNode::from_hex(hex)).collect()
    }

    /// Relay a transaction through the backend.
    pub async fn broadcast(&self, node: &TxNode) -> Result<(), CoreError> {
        let path = format!("{}/btc/blockchain/broadcast", self.protocol_version.api_prefix());
        self.transport
            .send(BackendRequest::post(path, serde_json::json!(node.to_hex())))
            .await?
            .expect_status(StatusCode::OK)?;
        info!(txid = %node.txid, "transaction broadcast");
        Ok(())
    }

    pub async fn get_mempool_hashes(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Txid>, CoreError> {
        let path = format!("{}/btc/blockchain/mempool-hashes", self.protocol_version.api_prefix());
        let hashes: Vec<String> = self
            .transport
            .send_and_retry(BackendRequest::get(path).with_cancel(cancel))
            .await?
            .expect_status(StatusCode::OK)?
            .json()?;

        hashes
            .iter()
            .map(|hash| {
                hash.parse()
                    .map_err(|e| CoreError::InvalidResponse(format!("invalid mempool txid: {e}")))
            })
            .collect()
    }

    /// Mempool txids truncated by the backend to their first `compactness`
    /// hex characters (1 to 64).
    pub async fn get_mempool_hashes_compact(
        &self,
        compactness: u8,
        cancel: &CancellationToken,
    ) -> Result<BTreeSet<String>, CoreError> {
        if !(1..=MAX_MEMPOOL_COMPACTNESS).contains(&compactness) {
            return Err(CoreError::Precondition(format!(
                "compactness must be between 1 and {MAX_MEMPOOL_COMPACTNESS}, got {compactness}"
            )));
        }

        let path = format!(
            "{}/btc/blockchain/mempool-hashes?compactness={compactness}",
            self.protocol_version.api_prefix()
        );
        self.transport
            .send_and_retry(BackendRequest::get(path).with_cancel(cancel))
            .await?
            .expect_status(StatusCode::OK)?
            .json()
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Up to `count` block filters after `best_known`. `None` means the
    /// backend has nothing newer.
    pub async fn get_filters(
        &self,
        best_known: BlockHash,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<Option<FiltersResponse>, CoreError> {
        let path = format!(
            "{}/btc/blockchain/filters?bestKnownBlockHash={best_known}&count={count}",
            self.protocol_version.api_prefix()
        );
        let resp = self
            .transport
            .send_and_retry(BackendRequest::get(path).with_cancel(cancel))
            .await?;

        if resp.status == StatusCode::NO_CONTENT {
            debug!(%best_known, "no new filters");
            return Ok(None);
        }
        resp.expect_status(StatusCode::OK)?.json().map(Some)
    }

    /// Filters, best height, round states, and optionally fee estimates in
    /// one call.
    pub async fn get_synchronize(
        &self,
        best_known: BlockHash,
        max_filters: u32,
        fee_mode: Option<FeeEstimateMode>,
        cancel: &CancellationToken,
    ) -> Result<SynchronizeResponse, CoreError> {
        let mut path = format!(
            "{}/btc/batch/synchronize?bestKnownBlockHash={best_known}&maxNumberOfFilters={max_filters}",
            self.protocol_version.api_prefix()
        );
        if let Some(mode) = fee_mode {
            path.push_str(&format!("&estimateSmartFeeMode={mode}"));
        }

        self.transport
            .send_and_retry(BackendRequest::get(path).with_cancel(cancel))
            .await?
            .expect_status(StatusCode::OK)?
            .json()
    }

    // ========================================================================
    // Off-chain and legal
    // ========================================================================

    pub async fn get_exchange_rates(&self) -> Result<Vec<ExchangeRate>, CoreError> {
        let path = format!("{}/btc/offchain/exchange-rates", self.protocol_version.api_prefix());
        self.transport
            .send_and_retry(BackendRequest::get(path))
            .await?
            .expect_status(StatusCode::OK)?
            .json()
    }

    pub async fn get_legal_documents(&self, cancel: &CancellationToken) -> Result<String, CoreError> {
        let path = format!("{}/wasabi/legaldocuments", self.protocol_version.api_prefix());
        let resp = self
            .transport
            .send_and_retry(BackendRequest::get(path).with_cancel(cancel))
            .await?
            .expect_status(StatusCode::OK)?;
        Ok(resp.body)
    }

    // ========================================================================
    // Software versions
    // ========================================================================

    /// Versions published by the backend. This endpoint is unversioned so it
    /// stays reachable whatever protocol version is active.
    pub async fn get_versions(&self, cancel: &CancellationToken) -> Result<VersionReport, CoreError> {
        let resp: VersionsResponse = self
            .transport
            .send_and_retry(BackendRequest::get("/api/software/versions").with_cancel(cancel))
            .await?
            .expect_status(StatusCode::OK)?
            .json()?;
        VersionReport::try_from(resp)
    }

    /// Compare the backend's versions with the local policy, switching the
    /// active protocol version when the backend's is supported.
    pub async fn check_updates(&self, cancel: &CancellationToken) -> Result<UpdateStatus, CoreError> {
        let report = self.get_versions(cancel).await?;
        let previous = self.protocol_version.get();
        let status = self.policy.apply(&report, &self.protocol_version);

        if status.backend_compatible {
            if previous != status.current_backend_major_version {
                info!(
                    from = previous,
                    to = status.current_backend_major_version,
                    "switched backend protocol version"
                );
            }
        } else {
            warn!(
                backend = status.current_backend_major_version,
                min = self.policy.window.min(),
                max = self.policy.window.max(),
                active = previous,
                "backend protocol version is not supported; keeping active version"
            );
        }
        if !status.client_up_to_date {
            warn!(
                local = %self.policy.local_client_version,
                required = %report.client_version,
                "client is older than the backend's minimum client version"
            );
        }

        Ok(status)
    }
}

// ==============================================================================
// Tests
// ==============================================================================
