pub mod block;
pub mod model;

pub use block::Block;
pub use model::{Blockchain, calculate_balance};

/// Target milliseconds per block for difficulty retargeting.
pub const MINE_RATE: i64 = 1000;

/// Difficulty of the genesis block (leading zero bits).
pub const INITIAL_DIFFICULTY: u32 = 3;

/// Genesis constants, shared by every node.
pub const GENESIS_TIMESTAMP: i64 = 1;
pub const GENESIS_LAST_HASH: &str = "1234567";
pub const GENESIS_HASH: &str = "----";
