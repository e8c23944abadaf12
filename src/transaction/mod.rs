pub mod model;
pub mod pool;

pub use model::Transaction;
pub use pool::TransactionPool;

/// Sentinel input address marking a miner reward.
pub const REWARD_ADDRESS: &str = "*authorized-reward*";

/// Fixed payout of a reward transaction.
pub const MINING_REWARD: u64 = 50;
