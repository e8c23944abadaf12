use serde::Serialize;

use crate::blockchain::{Block, calculate_balance};
use crate::crypto::KeyPair;
use crate::error::LedgerError;
use crate::transaction::Transaction;

/// Balance credited to every address that has never signed a transaction.
pub const STARTING_BALANCE: u64 = 1000;

/// A key pair plus the last balance derived for its address.
///
/// `balance` is a cached view of the chain, refreshed whenever a chain is
/// passed to `create_transaction`.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub balance: u64,
    key_pair: KeyPair,
    public_key: String,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    pub fn new() -> Self {
        let key_pair = KeyPair::generate();
        let public_key = key_pair.public_key_hex();
        Self {
            balance: STARTING_BALANCE,
            key_pair,
            public_key,
        }
    }

    /// Hex of the compressed public key.
    pub fn address(&self) -> &str {
        &self.public_key
    }

    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> String {
        self.key_pair.sign(data)
    }

    pub fn create_transaction(
        &mut self,
        recipient: &str,
        amount: u64,
        chain: Option<&[Block]>,
    ) -> Result<Transaction, LedgerError> {
        if let Some(chain) = chain {
            self.balance = calculate_balance(chain, &self.public_key);
        }
        Transaction::create(self, recipient, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::crypto::verify_signature;

    #[test]
    fn starts_with_balance_and_public_key() {
        let wallet = Wallet::new();
        assert_eq!(wallet.balance, STARTING_BALANCE);
        assert_eq!(wallet.address().len(), 66);
    }

    #[test]
    fn signature_verifies_against_own_key_only() {
        let wallet = Wallet::new();
        assert!(verify_signature(
            wallet.address(),
            "foobar",
            &wallet.sign("foobar")
        ));
        assert!(!verify_signature(
            wallet.address(),
            "foobar",
            &Wallet::new().sign("foobar")
        ));
    }

    #[test]
    fn create_transaction_rejects_amount_over_balance() {
        let mut wallet = Wallet::new();
        assert!(matches!(
            wallet.create_transaction("foo-recipient", 999_999, None),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn create_transaction_matches_sender_and_recipient() {
        let mut wallet = Wallet::new();
        let tx = wallet
            .create_transaction("foo-recipient", 10, None)
            .unwrap();
        assert_eq!(tx.input_address(), wallet.address());
        assert_eq!(tx.output_map()["foo-recipient"], 10);
    }

    #[test]
    fn create_transaction_refreshes_balance_from_chain() {
        let mut blockchain = Blockchain::new();
        let mut wallet = Wallet::new();
        let payer = Wallet::new();
        let incoming = Transaction::create(&payer, wallet.address(), 200).unwrap();
        blockchain.add_block(vec![incoming]);

        wallet
            .create_transaction("foo", 10, Some(&blockchain.chain))
            .unwrap();
        assert_eq!(wallet.balance, STARTING_BALANCE + 200);
    }

    #[test]
    fn create_transaction_with_chain_can_spend_received_funds() {
        let mut blockchain = Blockchain::new();
        let mut wallet = Wallet::new();
        let payer = Wallet::new();
        blockchain.add_block(vec![
            Transaction::create(&payer, wallet.address(), 500).unwrap(),
        ]);

        assert!(wallet.create_transaction("foo", 1200, None).is_err());
        let tx = wallet
            .create_transaction("foo", 1200, Some(&blockchain.chain))
            .unwrap();
        assert_eq!(tx.output_map()[wallet.address()], 300);
    }
}
