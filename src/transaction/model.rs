use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{MINING_REWARD, REWARD_ADDRESS};
use crate::crypto::verify_signature;
use crate::error::LedgerError;
use crate::wallet::Wallet;

/// Recipient address -> amount. Ordered so the signed payload is stable.
pub type OutputMap = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInput {
    pub timestamp: i64,
    /// Signer's balance when the transaction was created.
    pub amount: u64,
    /// Signer's public key (hex, compressed).
    pub address: String,
    /// Hex DER signature over `output_map`.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardInput {
    pub address: String,
}

impl RewardInput {
    pub fn sentinel() -> Self {
        Self {
            address: REWARD_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: String,
    pub output_map: OutputMap,
    pub input: TransferInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub output_map: OutputMap,
    pub input: RewardInput,
}

/// A signed transfer, or an unsigned miner reward.
///
/// Untagged on the wire: the two variants are told apart by the shape of
/// `input`. `Transfer` is tried first since its input is a superset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transaction {
    Transfer(Transfer),
    Reward(Reward),
}

impl Transaction {
    /// Spend `amount` of the sender's balance to `recipient`; the remainder
    /// is returned to the sender in the same output map.
    pub fn create(sender: &Wallet, recipient: &str, amount: u64) -> Result<Self, LedgerError> {
        if amount > sender.balance {
            return Err(LedgerError::InsufficientBalance {
                amount,
                balance: sender.balance,
            });
        }

        let mut output_map = OutputMap::new();
        output_map.insert(sender.address().to_string(), sender.balance - amount);
        *output_map.entry(recipient.to_string()).or_insert(0) += amount;

        let input = TransferInput {
            timestamp: Utc::now().timestamp_millis(),
            amount: sender.balance,
            address: sender.address().to_string(),
            signature: sender.sign(&output_map),
        };

        Ok(Transaction::Transfer(Transfer {
            id: Uuid::new_v4().to_string(),
            output_map,
            input,
        }))
    }

    /// Move `amount` out of the sender's remaining output to `recipient` and
    /// re-sign. Leaves the transaction untouched on error.
    pub fn update(
        &mut self,
        sender: &Wallet,
        recipient: &str,
        amount: u64,
    ) -> Result<(), LedgerError> {
        let Transaction::Transfer(transfer) = self else {
            return Err(LedgerError::RewardUpdate);
        };

        let address = sender.address();
        let remaining = transfer.output_map.get(address).copied().unwrap_or(0);
        if amount > remaining {
            return Err(LedgerError::InsufficientBalance {
                amount,
                balance: remaining,
            });
        }

        *transfer
            .output_map
            .entry(recipient.to_string())
            .or_insert(0) += amount;
        if let Some(own) = transfer.output_map.get_mut(address) {
            *own -= amount;
        }

        transfer.input = TransferInput {
            timestamp: Utc::now().timestamp_millis(),
            amount: transfer.input.amount,
            address: address.to_string(),
            signature: sender.sign(&transfer.output_map),
        };
        Ok(())
    }

    /// Unsigned transaction paying `MINING_REWARD` to the miner.
    pub fn reward(miner: &Wallet) -> Self {
        let mut output_map = OutputMap::new();
        output_map.insert(miner.address().to_string(), MINING_REWARD);
        Transaction::Reward(Reward {
            id: Uuid::new_v4().to_string(),
            output_map,
            input: RewardInput::sentinel(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            Transaction::Transfer(t) => &t.id,
            Transaction::Reward(r) => &r.id,
        }
    }

    pub fn output_map(&self) -> &OutputMap {
        match self {
            Transaction::Transfer(t) => &t.output_map,
            Transaction::Reward(r) => &r.output_map,
        }
    }

    pub fn input_address(&self) -> &str {
        match self {
            Transaction::Transfer(t) => &t.input.address,
            Transaction::Reward(r) => &r.input.address,
        }
    }

    /// Balance claimed by the signer; rewards claim none.
    pub fn input_amount(&self) -> Option<u64> {
        match self {
            Transaction::Transfer(t) => Some(t.input.amount),
            Transaction::Reward(_) => None,
        }
    }

    /// A reward is recognised by its sentinel input, not just by its shape.
    pub fn is_reward(&self) -> bool {
        matches!(self, Transaction::Reward(r) if r.input == RewardInput::sentinel())
    }

    pub fn total_output_amount(&self) -> u128 {
        self.output_map().values().map(|v| *v as u128).sum()
    }

    /// Outputs add up to the input amount and the input signature covers
    /// the output map. Rewards are never valid as standalone transfers.
    pub fn valid_transaction(&self) -> bool {
        let transfer = match self {
            Transaction::Transfer(t) => t,
            Transaction::Reward(r) => {
                error!(
                    "Invalid transaction {}: unsigned reward input from {}",
                    r.id, r.input.address
                );
                return false;
            }
        };

        let output_total = self.total_output_amount();
        if output_total != transfer.input.amount as u128 {
            error!(
                "Invalid transaction from {}: outputs total {} but input amount is {}",
                transfer.input.address, output_total, transfer.input.amount
            );
            return false;
        }

        if !verify_signature(
            &transfer.input.address,
            &transfer.output_map,
            &transfer.input.signature,
        ) {
            error!("Invalid signature from {}", transfer.input.address);
            return false;
        }

        true
    }
}
