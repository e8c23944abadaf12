use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::node::Node;
use crate::transaction::Transaction;

/// Shared application state: the node this process runs.
pub struct AppState {
    pub node: Arc<Node>,
}

/* ---------- Chain API Models ---------- */

#[derive(Deserialize)]
pub struct MineRequest {
    #[serde(default)]
    pub data: Vec<Transaction>,
}

/* ---------- TX API Models ---------- */

#[derive(Deserialize)]
pub struct TransactRequest {
    pub recipient: String,
    pub amount: u64,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransactResponse {
    Success { transaction: Transaction },
    Error { message: String },
}
