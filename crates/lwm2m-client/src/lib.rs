#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' backs the bounded-but-dynamic collections used by the data model
// facade, the observation engine and the send queue.
extern crate alloc;

// --- Foundation modules ---
pub mod common;
pub mod config;
pub mod error;
pub mod hal;
pub mod types;
mod log;

// --- Wire-level message model ---
pub mod message;

// --- CoAP exchange engine ---
pub mod exchange;

// --- Client lifecycle state machine ---
pub mod lifecycle;

// --- Data-model facade (external boundary) ---
pub mod dm;

// --- Server-initiated DM request servicing ---
pub mod dm_handler;

// --- Observation / notification engine ---
pub mod observe;

// --- Send (LwM2M Send operation) queue ---
pub mod send;

// --- Top-level exports ---
pub use config::Config;
pub use dm::{DataModel, ReadEntry, ResourceKind, ResourceValue};
pub use dm_handler::DmHandler;
pub use error::{CoreError, DmError};
pub use hal::{Clock, Rng, Transport, XorShiftRng};
pub use lifecycle::{Anj, ConnectionStatus, NextAction};
pub use message::Message;
pub use observe::{Attributes, ObservationEngine};
pub use send::{SendQueue, SendRequest};
pub use types::{ContentFormat, Operation, Ssid};
