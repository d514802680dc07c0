// crates/lwm2m-client/src/exchange/mod.rs

//! The CoAP exchange engine (§4.1): a single-in-flight request/response
//! state machine with retransmission, block-wise transfer and
//! server-request deduplication.

mod engine;
mod handlers;
mod state;

pub use engine::{EngineOutput, ExchangeEngine};
pub use handlers::{block_slice, ExchangeHandler, NoOpHandler};
pub use state::{BlockProgress, Direction, ExchangeContext, ExchangeState, UdpTxParams};
