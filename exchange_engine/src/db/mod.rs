//! Storage layer: the backend trait, shared result types and the sqlite implementation.

pub mod common;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use common::{BatchBillOutcome, CounterDecrement, InsertTransactionResult, SettleOutcome, SweepOutcome};
pub use traits::ExchangerDatabase;
