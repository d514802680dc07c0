// crates/lwm2m-client/src/exchange/state.rs

use crate::common::Token;
use crate::message::BlockOption;

/// The four states a single in-flight exchange moves through (§4.1).
///
/// An `ExchangeEngine` drives exactly one of these at a time: the
/// single-in-flight invariant means a second request cannot start until the
/// current one reaches `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No exchange in progress; the engine is idle.
    Finished,
    /// A message is built and waiting to be handed to the transport.
    MsgToSend,
    /// The message was handed to the transport; waiting for the host to
    /// confirm the datagram left the wire (RFC 7252's processing-delay budget).
    WaitingSendConfirmation,
    /// The message is on the wire; waiting for a reply or retransmission deadline.
    WaitingMsg,
}

/// Which side opened the exchange: affects retransmission ownership (the
/// client retransmits its own CON requests; server-initiated exchanges are
/// retransmitted by the peer, so this side only deduplicates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientInitiated,
    ServerInitiated,
}

/// Per-exchange block-wise transfer progress, tracked independently for the
/// outgoing (BLOCK1) and incoming (BLOCK2) directions (RFC 7959).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockProgress {
    pub block1: Option<BlockOption>,
    pub block2: Option<BlockOption>,
}

/// Per-exchange UDP transmission parameters (RFC 7252 §4.8), seeded from
/// `Config` but overridable per exchange via `set_udp_tx_params`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UdpTxParams {
    pub ack_timeout_ms: u64,
    pub ack_random_factor: f32,
    pub max_retransmit: u8,
}

/// All state one `ExchangeEngine` carries for its current (or just-finished)
/// exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeContext {
    pub state: ExchangeState,
    pub direction: Direction,
    pub token: Token,
    pub message_id: u16,
    pub retry_count: u8,
    pub blocks: BlockProgress,
    pub tx_params: UdpTxParams,
    /// Absolute deadline (ms, per `Clock::now_ms`) for the current wait.
    pub deadline_ms: u64,
    /// Current randomised retransmission timeout, recomputed each retry.
    pub current_timeout_ms: u64,
}

impl ExchangeContext {
    pub fn idle(tx_params: UdpTxParams) -> Self {
        ExchangeContext {
            state: ExchangeState::Finished,
            direction: Direction::ClientInitiated,
            token: Token::EMPTY,
            message_id: 0,
            retry_count: 0,
            blocks: BlockProgress::default(),
            tx_params,
            deadline_ms: 0,
            current_timeout_ms: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == ExchangeState::Finished
    }
}
