use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{GENESIS_HASH, GENESIS_LAST_HASH, GENESIS_TIMESTAMP, INITIAL_DIFFICULTY, MINE_RATE};
use crate::crypto::{crypto_hash, digest_parts, meets_difficulty};
use crate::transaction::Transaction;

/// A single block in the blockchain holding a list of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub timestamp: i64, // Unix millis (UTC)
    pub last_hash: String,
    pub hash: String,
    pub data: Vec<Transaction>,
    pub nonce: u64,
    /// Required leading zero bits of `hash`.
    pub difficulty: u32,
}

impl Block {
    /// The fixed first block. Not mined; exempt from the PoW check.
    pub fn genesis() -> Self {
        Self {
            timestamp: GENESIS_TIMESTAMP,
            last_hash: GENESIS_LAST_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            data: Vec::new(),
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
        }
    }

    /// Hash over timestamp, last hash, data, nonce and difficulty
    /// (excluding the `hash` field itself).
    pub fn compute_hash(&self) -> String {
        crypto_hash(&[
            json!(self.timestamp),
            json!(self.last_hash),
            json!(self.data),
            json!(self.nonce),
            json!(self.difficulty),
        ])
    }

    /// Proof-of-Work on top of `last_block`: bump the nonce, re-read the
    /// clock and retarget the difficulty until the hash has enough leading
    /// zero bits for the difficulty it was computed with.
    pub fn mine_block(last_block: &Block, data: Vec<Transaction>) -> Self {
        let mut search = Search::new(last_block, data);
        loop {
            if let Some(block) = search.attempt(now_millis()) {
                return block;
            }
        }
    }

    /// Same search as `mine_block`, abandoned as soon as `cancelled`
    /// returns true.
    pub fn mine_block_cancellable(
        last_block: &Block,
        data: Vec<Transaction>,
        cancelled: impl Fn() -> bool,
    ) -> Option<Self> {
        let mut search = Search::new(last_block, data);
        loop {
            if cancelled() {
                return None;
            }
            if let Some(block) = search.attempt(now_millis()) {
                return Some(block);
            }
        }
    }

    /// +1 if the block came within `MINE_RATE` of `original`, -1 otherwise.
    /// Never below 1.
    pub fn adjust_difficulty(original: &Block, timestamp: i64) -> u32 {
        if original.difficulty < 1 {
            return 1;
        }
        if timestamp - original.timestamp > MINE_RATE {
            return (original.difficulty - 1).max(1);
        }
        original.difficulty + 1
    }

    /// Cached hash matches the content and satisfies the block's own
    /// difficulty. (Does NOT validate chain linkage.)
    pub fn is_valid(&self) -> bool {
        self.hash == self.compute_hash() && meets_difficulty(&self.hash, self.difficulty)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Mining state for one candidate block. The data and last hash are
/// rendered to JSON once; only the numeric fields change per attempt.
pub(crate) struct Search<'a> {
    last_block: &'a Block,
    data: Vec<Transaction>,
    data_json: String,
    last_hash_json: String,
    nonce: u64,
}

impl<'a> Search<'a> {
    pub(crate) fn new(last_block: &'a Block, data: Vec<Transaction>) -> Self {
        Self {
            last_block,
            data_json: json!(data).to_string(),
            last_hash_json: json!(last_block.hash).to_string(),
            data,
            nonce: 0,
        }
    }

    /// Try the next nonce at `timestamp`.
    pub(crate) fn attempt(&mut self, timestamp: i64) -> Option<Block> {
        self.nonce += 1;
        let difficulty = Block::adjust_difficulty(self.last_block, timestamp);

        let timestamp_json = timestamp.to_string();
        let nonce_json = self.nonce.to_string();
        let difficulty_json = difficulty.to_string();
        let mut parts = [
            timestamp_json.as_str(),
            self.last_hash_json.as_str(),
            self.data_json.as_str(),
            nonce_json.as_str(),
            difficulty_json.as_str(),
        ];
        let hash = hex::encode(digest_parts(&mut parts));
        if !meets_difficulty(&hash, difficulty) {
            return None;
        }

        Some(Block {
            timestamp,
            last_hash: self.last_block.hash.clone(),
            hash,
            data: self.data.clone(),
            nonce: self.nonce,
            difficulty,
        })
    }
}
