/// Failures surfaced directly to the caller of a wallet or transaction operation.
///
/// Chain and transaction validation never produce these; they log a reason
/// and report `false` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Amount exceeds balance (amount: {amount}, balance: {balance})")]
    InsufficientBalance { amount: u64, balance: u64 },

    #[error("Reward transactions cannot be updated")]
    RewardUpdate,
}
