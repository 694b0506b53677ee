//! Exchange Engine
//!
//! Back-office engine for a multi-operator IDR-RUB exchange desk driven through chat. This library
//! holds the core logic and is dispatcher-agnostic: a chat front-end translates messages into the
//! intents exposed here and renders the results back.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@db`]). Sqlite is the supported backend. You should
//!    never need to access the database directly; go through the engine API instead. The exception
//!    is the data types stored in the database, which live in [`mod@db_types`] and are public.
//! 2. The engine public API ([`OrderFlowApi`]): one method per client or operator intent, from
//!    taking a new order through review, invoicing and reconciliation. Pricing itself is a pure
//!    function in [`mod@selector`].
//! 3. The shift scheduler ([`mod@scheduler`]), which opens and closes the working day on the Bali
//!    wall clock and archives stale orders when the desk opens.
mod db;

pub mod audit;
pub mod db_types;
pub mod helpers;
pub mod notify;
pub mod scheduler;
pub mod selector;
mod xge_api;

#[cfg(feature = "sqlite")]
pub use db::sqlite::{db_url, SqliteDatabase, SqliteDatabaseError};
pub use db::{
    common::{BatchBillOutcome, CounterDecrement, InsertTransactionResult, SettleOutcome, SweepOutcome},
    traits::ExchangerDatabase,
};
#[cfg(feature = "sqlite")]
pub use scheduler::start_shift_scheduler;
pub use scheduler::ShiftScheduler;
pub use xge_api::{OrderCreated, OrderFlowApi, OrderFlowError};
