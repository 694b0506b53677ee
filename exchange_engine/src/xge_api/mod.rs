//! The intent-level API of the engine: one method per operator or client action.

mod errors;
mod order_flow_api;

pub use errors::OrderFlowError;
pub use order_flow_api::{OrderCreated, OrderFlowApi};
