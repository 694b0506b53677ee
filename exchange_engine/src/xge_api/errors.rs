use thiserror::Error;

use crate::{
    db_types::{Role, TransactionStatus, TxNumber},
    selector::QuoteError,
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TxNumber),
    #[error("Transaction {number} already exists")]
    DuplicateTransaction { number: TxNumber },
    #[error("Transaction {number} is '{status}', which does not allow a move to '{attempted}'")]
    InvalidTransition { number: TxNumber, status: TransactionStatus, attempted: TransactionStatus },
    #[error("{actor} does not hold the '{required}' role this operation needs")]
    Forbidden { actor: String, required: Role },
    #[error("No rate card is currently published")]
    NoActualRates,
    #[error("No tier limits are configured")]
    NoRateLimits,
    #[error("Quote rejected: {0}")]
    QuoteRejected(#[from] QuoteError),
}

impl OrderFlowError {
    /// Backend errors lose their concrete type at this boundary; the message is all callers get.
    pub fn db<E: std::error::Error>(e: E) -> Self {
        Self::DatabaseError(e.to_string())
    }
}
