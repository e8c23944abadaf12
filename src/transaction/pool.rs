use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::model::Transaction;
use crate::blockchain::Block;

/// Unconfirmed transactions keyed by id, in insertion order.
/// Serialises as a JSON object keyed by transaction id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionPool {
    transaction_map: IndexMap<String, Transaction>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id. A replaced entry keeps its position.
    pub fn set_transaction(&mut self, transaction: Transaction) {
        self.transaction_map
            .insert(transaction.id().to_string(), transaction);
    }

    pub fn get(&self, id: &str) -> Option<&Transaction> {
        self.transaction_map.get(id)
    }

    /// The outstanding transaction signed by `input_address`, if any.
    pub fn existing_transaction(&self, input_address: &str) -> Option<&Transaction> {
        self.transaction_map
            .values()
            .find(|t| t.input_address() == input_address)
    }

    pub fn existing_transaction_mut(&mut self, input_address: &str) -> Option<&mut Transaction> {
        self.transaction_map
            .values_mut()
            .find(|t| t.input_address() == input_address)
    }

    /// Entries passing `Transaction::valid_transaction`; rejections are
    /// logged by the check itself.
    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.transaction_map
            .values()
            .filter(|t| t.valid_transaction())
            .cloned()
            .collect()
    }

    /// Remove one entry by id, keeping the order of the rest.
    pub fn remove(&mut self, id: &str) -> Option<Transaction> {
        self.transaction_map.shift_remove(id)
    }

    pub fn clear(&mut self) {
        self.transaction_map.clear();
    }

    /// Drop every transaction that already appears in a block of `chain`.
    pub fn clear_blockchain_transactions(&mut self, chain: &[Block]) {
        let confirmed: HashSet<&str> = chain
            .iter()
            .skip(1)
            .flat_map(|block| block.data.iter().map(Transaction::id))
            .collect();

        let before = self.transaction_map.len();
        self.transaction_map
            .retain(|id, _| !confirmed.contains(id.as_str()));
        debug!(
            "Pool pruned: {} -> {} (removed {})",
            before,
            self.transaction_map.len(),
            before - self.transaction_map.len()
        );
    }

    pub fn len(&self) -> usize {
        self.transaction_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transaction_map.is_empty()
    }
}
