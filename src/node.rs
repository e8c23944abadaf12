use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::blockchain::{Block, Blockchain, calculate_balance};
use crate::error::LedgerError;
use crate::pubsub::{Channel, Subscriber, Transport};
use crate::transaction::{Transaction, TransactionPool};
use crate::wallet::Wallet;

/// Everything a node mutates, guarded by a single lock.
#[derive(Debug)]
pub struct NodeState {
    pub blockchain: Blockchain,
    pub pool: TransactionPool,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletInfo {
    pub address: String,
    pub balance: u64,
}

/// One peer: chain, mempool and wallet, plus the transport used to gossip.
///
/// Several nodes can live in one process; nothing here is global.
pub struct Node {
    id: String,
    state: Mutex<NodeState>,
    /// Bumped on every accepted chain replacement. Miners compare it
    /// against the value they started with to abandon stale work.
    generation: AtomicU64,
    transport: Arc<dyn Transport>,
}

impl Node {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_wallet(Wallet::new(), transport)
    }

    pub fn with_wallet(wallet: Wallet, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: Mutex::new(NodeState {
                blockchain: Blockchain::new(),
                pool: TransactionPool::new(),
                wallet,
            }),
            generation: AtomicU64::new(0),
            transport,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().expect("mutex poisoned")
    }

    /// Snapshot of the full chain.
    pub fn chain(&self) -> Vec<Block> {
        self.lock().blockchain.chain.clone()
    }

    /// Snapshot of the mempool.
    pub fn pool(&self) -> TransactionPool {
        self.lock().pool.clone()
    }

    /// Address of the node wallet and its balance derived from the chain.
    pub fn wallet_info(&self) -> WalletInfo {
        let state = self.lock();
        let address = state.wallet.address().to_string();
        let balance = calculate_balance(&state.blockchain.chain, &address);
        WalletInfo { address, balance }
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        calculate_balance(&self.lock().blockchain.chain, address)
    }

    /// Mine `data` on top of the tip, append it and broadcast the chain.
    /// `None` if a peer chain replaced ours before the block was sealed.
    pub fn add_block(&self, data: Vec<Transaction>) -> Option<Block> {
        let (tip, started_at) = {
            let state = self.lock();
            (state.blockchain.last_block().clone(), self.generation())
        };
        self.mine_on(&tip, data, started_at)
    }

    /// Send `amount` from the node wallet. Folds into the wallet's pending
    /// pool transaction if there is one, otherwise creates a new one
    /// against the current chain balance. An entry under our address that
    /// does not verify is dropped first. Pool is otherwise unchanged on error.
    pub fn transact(&self, recipient: &str, amount: u64) -> Result<Transaction, LedgerError> {
        let tx = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let address = state.wallet.address().to_string();

            // Never re-sign an output map this wallet did not sign.
            if let Some(stale) = state
                .pool
                .existing_transaction(&address)
                .filter(|t| !t.valid_transaction())
                .map(|t| t.id().to_string())
            {
                warn!("Dropping invalid pool transaction {stale} claiming our address");
                state.pool.remove(&stale);
            }

            match state.pool.existing_transaction_mut(&address) {
                Some(existing) => {
                    existing.update(&state.wallet, recipient, amount)?;
                    existing.clone()
                }
                None => {
                    let tx = state.wallet.create_transaction(
                        recipient,
                        amount,
                        Some(&state.blockchain.chain),
                    )?;
                    state.pool.set_transaction(tx.clone());
                    tx
                }
            }
        };
        debug!("Transaction {} admitted to pool", tx.id());
        self.broadcast_transaction(&tx);
        Ok(tx)
    }

    /// Mine every valid pool transaction plus a reward for this node.
    pub fn mine_transactions(&self) -> Option<Block> {
        let (tip, data, started_at) = {
            let state = self.lock();
            if state.pool.is_empty() {
                debug!("Pool is empty, mining the reward alone");
            }
            let mut data = state.pool.valid_transactions();
            data.push(Transaction::reward(&state.wallet));
            (
                state.blockchain.last_block().clone(),
                data,
                self.generation(),
            )
        };
        self.mine_on(&tip, data, started_at)
    }

    /// Search for a block on `tip` without holding the lock, then append it.
    ///
    /// The search is abandoned once the generation moves past `started_at`,
    /// and a sealed block is dropped if the tip moved meanwhile.
    fn mine_on(&self, tip: &Block, data: Vec<Transaction>, started_at: u64) -> Option<Block> {
        debug!(
            "Mining {} transactions on top of {}",
            data.len(),
            tip.hash
        );

        let Some(block) = Block::mine_block_cancellable(tip, data, || {
            self.generation() != started_at
        }) else {
            info!("Mining abandoned: chain was replaced by a peer");
            return None;
        };

        let chain = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if !state.blockchain.append_mined_block(block.clone()) {
                return None;
            }
            state
                .pool
                .clear_blockchain_transactions(&state.blockchain.chain);
            state.blockchain.chain.clone()
        };
        info!(
            "Mined block #{} (hash={}, nonce={}, difficulty={}, txs={})",
            chain.len() - 1,
            block.hash,
            block.nonce,
            block.difficulty,
            block.data.len()
        );
        self.broadcast_chain(&chain);
        Some(block)
    }

    /// Fork choice against a candidate chain. On success, in-flight mining
    /// is cancelled and confirmed transactions leave the pool.
    pub fn replace_chain(&self, chain: Vec<Block>, validate_transactions: bool) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.blockchain.replace_chain(chain, validate_transactions) {
            return false;
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("Node {} now on chain generation {generation}", self.id);
        state
            .pool
            .clear_blockchain_transactions(&state.blockchain.chain);
        true
    }

    pub fn set_transaction(&self, transaction: Transaction) {
        let mut state = self.lock();
        let verb = if state.pool.get(transaction.id()).is_some() {
            "updated"
        } else {
            "added"
        };
        debug!("Pool {verb} transaction {}", transaction.id());
        state.pool.set_transaction(transaction);
        debug!("Pool now holds {} transactions", state.pool.len());
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn broadcast_chain(&self, chain: &[Block]) {
        match serde_json::to_string(chain) {
            Ok(message) => self.transport.publish(&self.id, Channel::Blockchain, &message),
            Err(e) => error!("Failed to serialize chain for broadcast: {e}"),
        }
    }

    pub fn broadcast_transaction(&self, transaction: &Transaction) {
        match serde_json::to_string(transaction) {
            Ok(message) => self
                .transport
                .publish(&self.id, Channel::Transaction, &message),
            Err(e) => error!("Failed to serialize transaction {}: {e}", transaction.id()),
        }
    }
}

impl Subscriber for Node {
    fn peer_id(&self) -> &str {
        &self.id
    }

    /// Inbound gossip. Malformed payloads are logged and dropped.
    fn handle_message(&self, channel: Channel, message: &str) {
        debug!(
            "Message received on {channel} by {} ({} bytes)",
            self.id,
            message.len()
        );
        match channel {
            Channel::Blockchain => match serde_json::from_str::<Vec<Block>>(message) {
                Ok(chain) => {
                    self.replace_chain(chain, true);
                }
                Err(e) => warn!("Ignoring malformed chain message: {e}"),
            },
            Channel::Transaction => match serde_json::from_str::<Transaction>(message) {
                Ok(tx) if tx.valid_transaction() => self.set_transaction(tx),
                Ok(tx) => warn!("Rejecting invalid transaction {} from gossip", tx.id()),
                Err(e) => warn!("Ignoring malformed transaction message: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::LocalBus;
    use crate::transaction::MINING_REWARD;
    use crate::transaction::model::{OutputMap, Transfer, TransferInput};
    use crate::wallet::STARTING_BALANCE;

    fn join(bus: &Arc<LocalBus>) -> Arc<Node> {
        let node = Arc::new(Node::new(bus.clone()));
        bus.subscribe(node.clone());
        node
    }

    /// Unsigned transfer claiming `victim` as its sender.
    fn forged_transfer(victim: &str) -> Transaction {
        Transaction::Transfer(Transfer {
            id: "forged".to_string(),
            output_map: OutputMap::from([
                ("attacker".to_string(), 999),
                (victim.to_string(), 1),
            ]),
            input: TransferInput {
                timestamp: 0,
                amount: STARTING_BALANCE,
                address: victim.to_string(),
                signature: "00".to_string(),
            },
        })
    }

    fn tip_and_generation(node: &Node) -> (Block, u64) {
        (node.chain().last().unwrap().clone(), node.generation())
    }

    #[test]
    fn new_node_starts_at_genesis_with_empty_pool() {
        let bus = LocalBus::new();
        let node = join(&bus);
        assert_eq!(node.chain(), vec![Block::genesis()]);
        assert!(node.pool().is_empty());
        assert_eq!(node.wallet_info().balance, STARTING_BALANCE);
    }

    #[test]
    fn transact_reaches_peer_pools() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let b = join(&bus);

        let tx = a.transact("foo", 40).unwrap();
        assert_eq!(a.pool().get(tx.id()), Some(&tx));
        assert_eq!(b.pool().get(tx.id()), Some(&tx));
    }

    #[test]
    fn repeated_transact_updates_the_pending_transaction() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let b = join(&bus);

        let first = a.transact("foo", 40).unwrap();
        let second = a.transact("foo", 10).unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(a.pool().len(), 1);
        assert_eq!(second.output_map()["foo"], 50);
        assert!(second.valid_transaction());
        assert_eq!(b.pool().get(second.id()), Some(&second));
    }

    #[test]
    fn overspend_is_reported_and_pool_untouched() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let b = join(&bus);

        assert!(matches!(
            a.transact("foo", STARTING_BALANCE + 1),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert!(a.pool().is_empty());
        assert!(b.pool().is_empty());

        let tx = a.transact("foo", 900).unwrap();
        let err = a.transact("bar", 200).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                amount: 200,
                balance: 100
            }
        );
        assert_eq!(a.pool().get(tx.id()), Some(&tx));
    }

    #[test]
    fn mined_transactions_propagate_and_leave_pools() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let b = join(&bus);
        let recipient = b.wallet_info().address;

        a.transact(&recipient, 50).unwrap();
        let block = a.mine_transactions().unwrap();

        assert_eq!(block.data.len(), 2);
        assert!(block.data.iter().any(Transaction::is_reward));
        assert_eq!(a.chain().len(), 2);
        assert_eq!(b.chain(), a.chain());
        assert!(a.pool().is_empty());
        assert!(b.pool().is_empty());

        assert_eq!(a.wallet_info().balance, STARTING_BALANCE - 50 + MINING_REWARD);
        assert_eq!(b.wallet_info().balance, STARTING_BALANCE + 50);
    }

    #[test]
    fn invalid_pool_entries_are_not_mined() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let outsider = Wallet::new();
        a.set_transaction(Transaction::reward(&outsider));

        let block = a.mine_transactions().unwrap();
        assert_eq!(block.data.len(), 1);
        assert_ne!(block.data[0].output_map().keys().next().unwrap(), outsider.address());
        // never confirmed, so it stays
        assert_eq!(a.pool().len(), 1);
    }

    #[test]
    fn add_block_broadcasts_the_chain() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let b = join(&bus);

        a.add_block(Vec::new()).unwrap();
        a.add_block(Vec::new()).unwrap();
        assert_eq!(b.chain().len(), 3);
        assert_eq!(b.chain(), a.chain());
    }

    #[test]
    fn peer_chain_with_bad_transaction_data_is_ignored() {
        let bus = LocalBus::new();
        let honest = join(&bus);

        let mut forged = Blockchain::new();
        let thief = Wallet::new();
        forged.add_block(vec![Transaction::reward(&thief), Transaction::reward(&thief)]);
        bus.publish(
            "forger",
            Channel::Blockchain,
            &serde_json::to_string(&forged.chain).unwrap(),
        );

        assert_eq!(honest.chain(), vec![Block::genesis()]);
        assert_eq!(honest.generation(), 0);
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let bus = LocalBus::new();
        let node = join(&bus);
        node.handle_message(Channel::Blockchain, "not json");
        node.handle_message(Channel::Transaction, "{\"id\": 1}");
        assert_eq!(node.chain().len(), 1);
        assert!(node.pool().is_empty());
    }

    #[test]
    fn accepted_replacement_bumps_generation_and_prunes_pool() {
        let bus = LocalBus::new();
        let node = join(&bus);

        let payer = Wallet::new();
        let tx = Transaction::create(&payer, "foo", 5).unwrap();
        node.set_transaction(tx.clone());

        let mut longer = Blockchain::new();
        longer.add_block(vec![tx, Transaction::reward(&Wallet::new())]);

        assert!(node.replace_chain(longer.chain.clone(), true));
        assert_eq!(node.generation(), 1);
        assert!(node.pool().is_empty());
        assert!(!node.replace_chain(longer.chain, true));
        assert_eq!(node.generation(), 1);
    }

    #[test]
    fn gossiped_transaction_that_does_not_verify_is_dropped() {
        let bus = LocalBus::new();
        let node = join(&bus);
        let forged = forged_transfer(&node.wallet_info().address);

        bus.publish(
            "attacker",
            Channel::Transaction,
            &serde_json::to_string(&forged).unwrap(),
        );
        assert!(node.pool().is_empty());
    }

    #[test]
    fn transact_never_signs_a_planted_entry() {
        let bus = LocalBus::new();
        let node = join(&bus);
        let me = node.wallet_info().address;
        node.set_transaction(forged_transfer(&me));

        let tx = node.transact("bob", 1).unwrap();
        assert_ne!(tx.id(), "forged");
        assert!(tx.valid_transaction());
        assert!(!tx.output_map().contains_key("attacker"));
        assert!(node.pool().get("forged").is_none());

        let block = node.mine_transactions().unwrap();
        assert!(block.data.iter().all(|t| t.id() != "forged"));
        assert_eq!(node.balance_of("attacker"), STARTING_BALANCE);
        assert_eq!(node.balance_of("bob"), STARTING_BALANCE + 1);
        assert_eq!(node.balance_of(&me), STARTING_BALANCE - 1 + MINING_REWARD);
    }

    #[test]
    fn replacement_during_search_abandons_the_block() {
        let bus = LocalBus::new();
        let node = join(&bus);
        let pending = node.transact("foo", 25).unwrap();
        let (tip, started_at) = tip_and_generation(&node);

        let mut longer = Blockchain::new();
        longer.add_block(Vec::new());
        longer.add_block(Vec::new());
        assert!(node.replace_chain(longer.chain.clone(), true));

        let data = vec![pending.clone(), Transaction::reward(&Wallet::new())];
        assert!(node.mine_on(&tip, data, started_at).is_none());
        assert_eq!(node.chain(), longer.chain);
        assert_eq!(node.pool().get(pending.id()), Some(&pending));
    }

    #[test]
    fn replacement_from_another_thread_keeps_the_node_consistent() {
        let bus = LocalBus::new();
        let node = join(&bus);
        let pending = node.transact("foo", 25).unwrap();

        let mut longer = Blockchain::new();
        for _ in 0..3 {
            longer.add_block(Vec::new());
        }
        let incoming = longer.chain.clone();

        let miner = {
            let node = node.clone();
            std::thread::spawn(move || node.mine_transactions())
        };
        let replaced = node.replace_chain(incoming, true);
        let mined = miner.join().unwrap();

        let chain = node.chain();
        assert!(replaced);
        assert!(chain.len() >= longer.chain.len());
        assert!(Blockchain::is_valid_chain(&chain));
        assert!(Blockchain::valid_transaction_data(&chain));
        if mined.is_none() {
            assert_eq!(chain, longer.chain);
            assert_eq!(node.pool().get(pending.id()), Some(&pending));
        }
    }

    #[test]
    fn block_sealed_on_a_stale_tip_is_discarded() {
        let bus = LocalBus::new();
        let node = join(&bus);
        let (tip, started_at) = tip_and_generation(&node);

        let committed = node.add_block(Vec::new()).unwrap();
        assert_eq!(node.generation(), started_at);

        assert!(node.mine_on(&tip, Vec::new(), started_at).is_none());
        assert_eq!(node.chain(), vec![Block::genesis(), committed]);
    }

    #[test]
    fn nodes_mining_in_turn_converge() {
        let bus = LocalBus::new();
        let a = join(&bus);
        let b = join(&bus);
        let c = join(&bus);

        a.transact(&b.wallet_info().address, 10).unwrap();
        a.mine_transactions().unwrap();
        b.transact(&c.wallet_info().address, 20).unwrap();
        b.mine_transactions().unwrap();
        c.mine_transactions().unwrap();

        assert_eq!(a.chain().len(), 4);
        assert_eq!(a.chain(), b.chain());
        assert_eq!(b.chain(), c.chain());
        assert!(Blockchain::valid_transaction_data(&c.chain()));
        assert_eq!(
            c.wallet_info().balance,
            STARTING_BALANCE + 20 + MINING_REWARD
        );
    }
}
