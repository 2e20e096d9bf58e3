use std::collections::{HashMap, HashSet, VecDeque};

use bitcoin::Txid;
use tokio::sync::Mutex;

use crate::error::CoreError;
use crate::types::TxNode;

/// Default number of transactions kept in memory.
pub const DEFAULT_TX_CACHE_CAPACITY: usize = 1000;

// ==============================================================================
// Lookup Result
// ==============================================================================

/// Partition of a requested id set into cached transactions and ids that
/// still have to be fetched. Both sides keep the caller's id order.
#[derive(Debug, Default)]
pub struct CacheLookup {
    pub hits: Vec<TxNode>,
    pub misses: Vec<Txid>,
}

// ==============================================================================
// Cache
// ==============================================================================

struct Entries {
    transactions: HashMap<Txid, TxNode>,
    /// Insertion order, oldest first. Holds exactly the keys of `transactions`.
    insertion_order: VecDeque<Txid>,
}

impl Entries {
    fn insert_one(&mut self, node: TxNode, capacity: usize) -> Option<Txid> {
        if self.transactions.contains_key(&node.txid) {
            return None;
        }

        self.insertion_order.push_back(node.txid);
        self.transactions.insert(node.txid, node);

        if self.transactions.len() > capacity {
            let oldest = self.insertion_order.pop_front()?;
            self.transactions.remove(&oldest);
            return Some(oldest);
        }
        None
    }
}

/// Bounded in-memory transaction cache with first-in-first-out eviction.
///
/// Shared between fetchers via `Arc<TxCache>`. Reads never refresh an
/// entry's position; only inserting a new id does, and re-inserting a
/// present id is a no-op. The map and its eviction queue sit behind one
/// mutex so they are always observed together.
pub struct TxCache {
    entries: Mutex<Entries>,
    capacity: usize,
}

impl TxCache {
    pub fn new() -> Self {
        Self::build(DEFAULT_TX_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::Config(
                "transaction cache capacity must be at least 1".to_owned(),
            ));
        }
        Ok(Self::build(capacity))
    }

    fn build(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                transactions: HashMap::with_capacity(capacity),
                insertion_order: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Split `txids` into cached transactions and misses. Duplicate ids are
    /// reported once, at their first position.
    pub async fn lookup(&self, txids: &[Txid]) -> CacheLookup {
        let entries = self.entries.lock().await;
        let mut seen = HashSet::with_capacity(txids.len());
        let mut result = CacheLookup::default();

        for txid in txids {
            if !seen.insert(*txid) {
                continue;
            }
            match entries.transactions.get(txid) {
                Some(node) => result.hits.push(node.clone()),
                None => result.misses.push(*txid),
            }
        }
        result
    }

    /// Insert transactions one at a time, evicting the oldest entry whenever a
    /// new id pushes the cache over capacity.
    pub async fn insert(&self, nodes: impl IntoIterator<Item = TxNode>) {
        let mut entries = self.entries.lock().await;
        for node in nodes {
            if let Some(evicted) = entries.insert_one(node, self.capacity) {
                tracing::trace!(%evicted, "evicted transaction from cache");
            }
        }
    }

    pub async fn get(&self, txid: &Txid) -> Option<TxNode> {
        self.entries.lock().await.transactions.get(txid).cloned()
    }

    pub async fn contains(&self, txid: &Txid) -> bool {
        self.entries.lock().await.transactions.contains_key(txid)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.transactions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cached ids, oldest first.
    pub async fn ids_in_eviction_order(&self) -> Vec<Txid> {
        self.entries
            .lock()
            .await
            .insertion_order
            .iter()
            .copied()
            .collect()
    }
}

impl Default for TxCache {
    fn default() -> Self {
        Self::new()
    }
}
