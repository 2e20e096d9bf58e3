//! Shared test helpers for `chaumian-core` unit tests.
//!
//! Builders for deterministic transactions (`make_tx_node`, `coinbase_node`)
//! and for nodes with hand-picked ids (`forged_node`), used where a test needs
//! spend relationships that real hashes cannot express, such as cycles.

use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::types::{ActiveOutput, TxNode, UnblindedSignature};

// ==============================================================================
// Txid Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

// ==============================================================================
// Transaction Builders
// ==============================================================================

fn spend(parent: Txid) -> TxIn {
    TxIn {
        previous_output: OutPoint::new(parent, 0),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    }
}

fn raw_tx(seed: u32, input: Vec<TxIn>) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::from_consensus(seed),
        input,
        output: vec![TxOut {
            value: Amount::from_sat(10_000 + u64::from(seed)),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// A real transaction spending output 0 of each parent. `seed` makes the
/// content (and so the txid) unique. Parentless nodes spend an outpoint that
/// no test ever fetches, so the transaction still has one input.
pub fn make_tx_node(seed: u32, parents: &[Txid]) -> TxNode {
    let input = if parents.is_empty() {
        vec![spend(txid_from_byte(0xEE))]
    } else {
        parents.iter().copied().map(spend).collect()
    };
    TxNode::from_transaction(raw_tx(seed, input))
}

/// A node whose `txid` is chosen by the test instead of computed.
pub fn forged_node(txid: Txid, parents: &[Txid]) -> TxNode {
    let mut node = make_tx_node(u32::from(txid.as_byte_array()[0]), parents);
    node.txid = txid;
    node
}

/// A coinbase transaction (single input with a null prevout).
pub fn coinbase_node(seed: u32) -> TxNode {
    let input = TxIn {
        previous_output: OutPoint::null(),
        script_sig: ScriptBuf::from_bytes(seed.to_le_bytes().to_vec()),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    };
    TxNode::from_transaction(raw_tx(seed, vec![input]))
}

/// A chain `n` long where each node spends the previous one.
pub fn make_chain(n: u32) -> Vec<TxNode> {
    let mut chain: Vec<TxNode> = Vec::with_capacity(n as usize);
    for seed in 0..n {
        let parents: Vec<Txid> = chain.last().map(|p| p.txid).into_iter().collect();
        chain.push(make_tx_node(seed + 1, &parents));
    }
    chain
}

// ==============================================================================
// Output Builders
// ==============================================================================

pub fn test_address() -> Address {
    "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        .parse::<Address<NetworkUnchecked>>()
        .expect("static address must parse")
        .assume_checked()
}

pub fn test_output() -> ActiveOutput {
    ActiveOutput::new(
        test_address(),
        UnblindedSignature::new(vec![0xAB, 0xCD, 0xEF]),
        0,
    )
}
