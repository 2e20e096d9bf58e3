use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use bitcoin::Txid;

use crate::error::CoreError;
use crate::types::TxNode;

// ==============================================================================
// Dependency Ordering
// ==============================================================================

/// Order transactions so that each one comes after every transaction it
/// spends from.
///
/// Only spend edges between transactions in `nodes` are considered; parents
/// outside the set are ignored. Among transactions that are free to go next,
/// the one seen first in `nodes` wins, so the same input always yields the
/// same output. Duplicate txids keep their first occurrence.
///
/// Returns `CoreError::CycleDetected` with the txids that could not be placed
/// if the spend edges form a cycle.
pub fn order_by_dependency(nodes: Vec<TxNode>) -> Result<Vec<TxNode>, CoreError> {
    let mut position: HashMap<Txid, usize> = HashMap::with_capacity(nodes.len());
    let mut unique: Vec<TxNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if position.contains_key(&node.txid) {
            continue;
        }
        position.insert(node.txid, unique.len());
        unique.push(node);
    }

    // in_degree[i]: in-set parents of i not yet emitted.
    // children[j]: nodes that spend from j.
    let mut in_degree = vec![0usize; unique.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
    for (idx, node) in unique.iter().enumerate() {
        for parent in node.dependencies() {
            if let Some(&parent_idx) = position.get(&parent) {
                in_degree[idx] += 1;
                children[parent_idx].push(idx);
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| Reverse(idx))
        .collect();

    let mut order = Vec::with_capacity(unique.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        for &child in &children[idx] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.push(Reverse(child));
            }
        }
    }

    if order.len() < unique.len() {
        let txids = unique
            .iter()
            .zip(&in_degree)
            .filter(|(_, degree)| **degree > 0)
            .map(|(node, _)| node.txid)
            .collect();
        return Err(CoreError::CycleDetected { txids });
    }

    let mut slots: Vec<Option<TxNode>> = unique.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect())
}

// ==============================================================================
// Tests
// ==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;

    fn ids(nodes: &[TxNode]) -> Vec<Txid> {
        nodes.iter().map(|n| n.txid).collect()
    }

    fn assert_parents_first(ordered: &[TxNode]) {
        let position: HashMap<Txid, usize> = ordered
            .iter()
            .enumerate()
            .map(|(idx, n)| (n.txid, idx))
            .collect();
        for (idx, node) in ordered.iter().enumerate() {
            for parent in node.dependencies() {
                if let Some(parent_idx) = position.get(&parent) {
                    assert!(
                        *parent_idx < idx,
                        "{parent} must precede {} in the output",
                        node.txid
                    );
                }
            }
        }
    }

    #[test]
    fn reversed_chain_is_put_in_spend_order() {
        let chain = make_chain(4);
        let mut reversed = chain.clone();
        reversed.reverse();

        let ordered = order_by_dependency(reversed).expect("acyclic");
        assert_eq!(ids(&ordered), ids(&chain));
    }

    #[test]
    fn diamond_respects_every_edge() {
        //      root
        //     /    \
        //   left  right
        //     \    /
        //     merge
        let root = make_tx_node(1, &[]);
        let left = make_tx_node(2, &[root.txid]);
        let right = make_tx_node(3, &[root.txid]);
        let merge = make_tx_node(4, &[left.txid, right.txid]);

        let input = vec![merge.clone(), right.clone(), left.clone(), root.clone()];
        let ordered = order_by_dependency(input).expect("acyclic");

        assert_parents_first(&ordered);
        // right was seen before left, so it wins the tie once root is out.
        assert_eq!(
            ids(&ordered),
            vec![root.txid, right.txid, left.txid, merge.txid]
        );
    }

    #[test]
    fn independent_transactions_keep_input_order() {
        let input: Vec<TxNode> = (0..5).map(|seed| make_tx_node(seed, &[])).collect();
        let ordered = order_by_dependency(input.clone()).expect("acyclic");
        assert_eq!(ids(&ordered), ids(&input));
    }

    #[test]
    fn parents_outside_the_set_are_ignored() {
        let outside = txid_from_byte(0x42);
        let a = make_tx_node(1, &[outside]);
        let b = make_tx_node(2, &[a.txid, outside]);

        let ordered = order_by_dependency(vec![b.clone(), a.clone()]).expect("acyclic");
        assert_eq!(ids(&ordered), vec![a.txid, b.txid]);
    }

    #[test]
    fn ordering_is_deterministic() {
        let chain = make_chain(3);
        let loose = make_tx_node(50, &[]);
        let child = make_tx_node(51, &[chain[1].txid, loose.txid]);
        let input = vec![
            child,
            chain[2].clone(),
            loose,
            chain[0].clone(),
            chain[1].clone(),
        ];

        let first = order_by_dependency(input.clone()).expect("acyclic");
        let second = order_by_dependency(input).expect("acyclic");
        assert_eq!(ids(&first), ids(&second));
        assert_parents_first(&first);
    }

    #[test]
    fn duplicate_txids_are_collapsed() {
        let chain = make_chain(2);
        let input = vec![chain[1].clone(), chain[0].clone(), chain[1].clone()];
        let ordered = order_by_dependency(input).expect("acyclic");
        assert_eq!(ids(&ordered), ids(&chain));
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let a_id = txid_from_byte(1);
        let b_id = txid_from_byte(2);
        let a = forged_node(a_id, &[b_id]);
        let b = forged_node(b_id, &[a_id]);

        let err = order_by_dependency(vec![a, b]).expect_err("cycle must be rejected");
        match err {
            CoreError::CycleDetected { txids } => {
                assert_eq!(txids.len(), 2);
                assert!(txids.contains(&a_id) && txids.contains(&b_id));
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn cycle_reports_only_unplaceable_nodes() {
        let free = make_tx_node(9, &[]);
        let a_id = txid_from_byte(1);
        let b_id = txid_from_byte(2);
        let a = forged_node(a_id, &[b_id, free.txid]);
        let b = forged_node(b_id, &[a_id]);

        let err = order_by_dependency(vec![free.clone(), a, b]).expect_err("cycle");
        let CoreError::CycleDetected { txids } = err else {
            panic!("expected CycleDetected");
        };
        assert!(!txids.contains(&free.txid));
        assert_eq!(txids.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(order_by_dependency(Vec::new()).expect("empty").is_empty());
    }
}
