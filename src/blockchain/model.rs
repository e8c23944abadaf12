use log::{error, info, warn};
use std::collections::HashSet;

use super::Block;
use crate::crypto::meets_difficulty;
use crate::transaction::{MINING_REWARD, Transaction};
use crate::wallet::STARTING_BALANCE;

/// Simple in-memory blockchain with Proof-of-Work.
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub chain: Vec<Block>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Initialize a new blockchain with the genesis block.
    pub fn new() -> Self {
        Self {
            chain: vec![Block::genesis()],
        }
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("Blockchain should always have at least the genesis block")
    }

    /// Mine and append a new block with the provided `data`.
    pub fn add_block(&mut self, data: Vec<Transaction>) -> &Block {
        let block = Block::mine_block(self.last_block(), data);
        self.chain.push(block);
        self.last_block()
    }

    /// Append a block mined elsewhere. Refused unless it extends the
    /// current tip and carries a valid proof of work.
    pub fn append_mined_block(&mut self, block: Block) -> bool {
        let tip = self.last_block();
        if block.last_hash != tip.hash {
            warn!(
                "Discarding mined block {}: tip moved to {}",
                block.hash, tip.hash
            );
            return false;
        }
        if !block.is_valid() || tip.difficulty.abs_diff(block.difficulty) > 1 {
            error!("Discarding mined block {}: invalid proof of work", block.hash);
            return false;
        }
        self.chain.push(block);
        true
    }

    /// Validate a whole chain: genesis, linkage, hashes, PoW and
    /// difficulty steps.
    pub fn is_valid_chain(chain: &[Block]) -> bool {
        if chain.first() != Some(&Block::genesis()) {
            warn!("Chain rejected: does not start with the genesis block");
            return false;
        }

        for (i, pair) in chain.windows(2).enumerate() {
            let (prev, current) = (&pair[0], &pair[1]);
            let index = i + 1;

            if current.last_hash != prev.hash {
                warn!("Chain rejected: block {index} does not link to its predecessor");
                return false;
            }
            if current.hash != current.compute_hash() {
                warn!("Chain rejected: block {index} hash does not match its content");
                return false;
            }
            if !meets_difficulty(&current.hash, current.difficulty) {
                warn!(
                    "Chain rejected: block {index} hash does not meet difficulty {}",
                    current.difficulty
                );
                return false;
            }
            if prev.difficulty.abs_diff(current.difficulty) > 1 {
                warn!(
                    "Chain rejected: block {index} jumps difficulty {} -> {}",
                    prev.difficulty, current.difficulty
                );
                return false;
            }
        }

        true
    }

    /// Economic checks on every block after genesis: one correctly sized
    /// reward at most, valid signatures, input amounts equal to the
    /// balance derived from the blocks before, no repeated ids.
    pub fn valid_transaction_data(chain: &[Block]) -> bool {
        for (i, block) in chain.iter().enumerate().skip(1) {
            let mut seen = HashSet::new();
            let mut reward_count = 0;

            for tx in &block.data {
                if !seen.insert(tx.id()) {
                    error!(
                        "Transaction {} appears more than once in block {i}",
                        tx.id()
                    );
                    return false;
                }

                if tx.is_reward() {
                    reward_count += 1;
                    if reward_count > 1 {
                        error!("Miner rewards exceed limit in block {i}");
                        return false;
                    }
                    let outputs = tx.output_map();
                    if outputs.len() != 1 || outputs.values().any(|v| *v != MINING_REWARD) {
                        error!("Miner reward amount is invalid in block {i}");
                        return false;
                    }
                    continue;
                }

                if !tx.valid_transaction() {
                    error!("Invalid transaction {} in block {i}", tx.id());
                    return false;
                }

                let true_balance = calculate_balance(&chain[..i], tx.input_address());
                if tx.input_amount() != Some(true_balance) {
                    error!(
                        "Invalid input amount for transaction {} in block {i}: claimed {:?}, balance {}",
                        tx.id(),
                        tx.input_amount(),
                        true_balance
                    );
                    return false;
                }
            }
        }

        true
    }

    /// Longest valid chain wins; ties keep the local chain.
    pub fn replace_chain(&mut self, new_chain: Vec<Block>, validate_transactions: bool) -> bool {
        if new_chain.len() <= self.chain.len() {
            error!(
                "The incoming chain must be longer ({} <= {})",
                new_chain.len(),
                self.chain.len()
            );
            return false;
        }
        if !Self::is_valid_chain(&new_chain) {
            error!("The incoming chain must be valid");
            return false;
        }
        if validate_transactions && !Self::valid_transaction_data(&new_chain) {
            error!("The incoming chain has invalid transaction data");
            return false;
        }

        info!(
            "Replacing chain ({} -> {} blocks), new tip {}",
            self.chain.len(),
            new_chain.len(),
            new_chain.last().map(|b| b.hash.as_str()).unwrap_or_default()
        );
        self.chain = new_chain;
        true
    }
}

/// Balance of `address` by replaying the chain from the tip backward.
///
/// Every output to `address` is summed until a block containing a
/// transaction signed by `address` has been processed. That whole block
/// still counts, since the signer's change output already carries the
/// balance at that point; nothing older does. If no such block exists the
/// starting balance is added.
pub fn calculate_balance(chain: &[Block], address: &str) -> u64 {
    let mut has_conducted_transaction = false;
    let mut outputs_total: u64 = 0;

    for block in chain.iter().skip(1).rev() {
        for tx in &block.data {
            if tx.input_address() == address {
                has_conducted_transaction = true;
            }
            if let Some(amount) = tx.output_map().get(address) {
                outputs_total = outputs_total.saturating_add(*amount);
            }
        }
        if has_conducted_transaction {
            break;
        }
    }

    if has_conducted_transaction {
        outputs_total
    } else {
        outputs_total.saturating_add(STARTING_BALANCE)
    }
}
