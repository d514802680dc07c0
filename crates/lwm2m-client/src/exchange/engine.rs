// crates/lwm2m-client/src/exchange/engine.rs

use alloc::string::String;
use alloc::vec::Vec;

use crate::common::Token;
use crate::dm::DataModel;
use crate::error::CoreError;
use crate::hal::Rng;
use crate::log::{lwm2m_debug, lwm2m_warn};
use crate::message::{BlockOption, Confirmable, Message};
use crate::types::{CoapCode, ContentFormat, Operation};

use super::handlers::ExchangeHandler;
use super::state::{BlockProgress, Direction, ExchangeContext, ExchangeState, UdpTxParams};

/// Block1/Block2 size negotiated when the handler hasn't been asked for a
/// block yet (RFC 7959 §2.2 allows any power of two up to 1024).
const DEFAULT_BLOCK_SIZE: usize = 1024;

/// What the host should do after a `process` call.
pub enum EngineOutput<'a> {
    /// Hand this datagram to the transport.
    Send(Message<'a>),
    /// Nothing to send right now; call `process` again no later than this deadline.
    WaitUntil(u64),
    /// The exchange finished (successfully or not); the engine is idle again.
    Idle,
}

/// Drives a single in-flight CoAP exchange: retransmission timing,
/// block-wise transfer in both directions, and server-request
/// deduplication. Generic over the per-operation [`ExchangeHandler`], mirroring
/// the teacher repo's counters/handler split in its error-management type.
pub struct ExchangeEngine<H: ExchangeHandler> {
    ctx: ExchangeContext,
    operation: Operation,
    confirmable: Confirmable,
    uri_path: String,
    content_format: Option<ContentFormat>,
    /// Outgoing payload, filled one block at a time from the handler.
    out_buf: Vec<u8>,
    /// Accumulated incoming payload across BLOCK1 blocks.
    in_buf: Vec<u8>,
    response_code: CoapCode,
    /// Cache of the last server-initiated exchange's message id and response,
    /// used to answer a retransmitted duplicate without re-invoking the handler.
    last_server_msg_id: Option<u16>,
    last_server_response: Vec<u8>,
    handler: H,
}

impl<H: ExchangeHandler> ExchangeEngine<H> {
    pub fn new(tx_params: UdpTxParams, handler: H) -> Self {
        ExchangeEngine {
            ctx: ExchangeContext::idle(tx_params),
            operation: Operation::CoapEmpty,
            confirmable: Confirmable::Con,
            uri_path: String::new(),
            content_format: None,
            out_buf: Vec::new(),
            in_buf: Vec::new(),
            response_code: CoapCode::EMPTY,
            last_server_msg_id: None,
            last_server_response: Vec::new(),
            handler,
        }
    }

    pub fn state(&self) -> ExchangeState {
        self.ctx.state
    }

    pub fn ongoing(&self) -> bool {
        !self.ctx.is_idle()
    }

    /// Rejects mid-exchange changes: parameters only apply to the next exchange.
    pub fn set_udp_tx_params(&mut self, params: UdpTxParams) -> Result<(), CoreError> {
        if self.ongoing() {
            return Err(CoreError::ExchangeBusy);
        }
        if params.ack_random_factor < 1.0 || params.ack_timeout_ms < 1_000 {
            return Err(CoreError::InvalidUdpTxParams);
        }
        self.ctx.tx_params = params;
        Ok(())
    }

    /// Starts a new client-initiated request: the single-in-flight invariant
    /// means this fails with `ExchangeBusy` unless the engine is idle.
    #[allow(clippy::too_many_arguments)]
    pub fn new_client_request(
        &mut self,
        now_ms: u64,
        rng: &mut dyn Rng,
        operation: Operation,
        uri_path: &str,
        confirmable: Confirmable,
        content_format: Option<ContentFormat>,
        handler: H,
    ) -> Result<(), CoreError> {
        if self.ongoing() {
            return Err(CoreError::ExchangeBusy);
        }
        let mut token_bytes = [0u8; crate::types::MAX_TOKEN_LEN];
        rng.fill_bytes(&mut token_bytes);

        self.operation = operation;
        self.confirmable = confirmable;
        self.uri_path.clear();
        self.uri_path.push_str(uri_path);
        self.content_format = content_format;
        self.out_buf.clear();
        self.in_buf.clear();
        self.handler = handler;
        // Otherwise a fresh request would carry the previous exchange's
        // response code, since the codec only derives the method code from
        // `Operation` when it sees this sentinel.
        self.response_code = CoapCode::EMPTY;

        self.ctx.direction = Direction::ClientInitiated;
        self.ctx.token = Token::new(&token_bytes)?;
        self.ctx.message_id = (rng.next_u32() & 0xFFFF) as u16;
        self.ctx.retry_count = 0;
        self.ctx.blocks = BlockProgress::default();
        self.ctx.current_timeout_ms = self.initial_timeout(rng);
        self.ctx.deadline_ms = now_ms + self.ctx.tx_params.ack_timeout_ms.max(self.ctx.current_timeout_ms);
        self.ctx.state = ExchangeState::MsgToSend;
        Ok(())
    }

    /// Overrides the token a just-started client request will use on the
    /// wire. Needed for NOTIFY, which must carry the token from the
    /// observation's original Observe request rather than a fresh random one
    /// (RFC 7641 §3.4). Only valid for the exchange `new_client_request` just
    /// opened, before any bytes are sent.
    pub fn set_client_token(&mut self, token: Token) -> Result<(), CoreError> {
        if self.ctx.direction != Direction::ClientInitiated || self.ctx.state != ExchangeState::MsgToSend {
            return Err(CoreError::Internal("set_client_token outside a fresh client exchange"));
        }
        self.ctx.token = token;
        Ok(())
    }

    /// Begins tracking a request the server initiated (an incoming message
    /// while the engine was idle). Deduplicates immediately if its message
    /// id matches the last server-initiated exchange handled.
    ///
    /// Single-datagram only: a `block1` option with `more` set is accepted
    /// (each additional fragment updates `in_buf` the same as a client's
    /// block2 download does) but there is no re-entrant resumption path for
    /// a server request that arrives split across many engine ticks beyond
    /// what `on_incoming` already handles once this call seeds the exchange.
    pub fn new_server_request(&mut self, now_ms: u64, incoming: &Message<'_>, handler: H, dm: &mut dyn DataModel) -> Result<bool, CoreError> {
        if self.ongoing() {
            return Err(CoreError::ExchangeBusy);
        }
        if self.last_server_msg_id == Some(incoming.message_id) {
            lwm2m_debug!("duplicate server request msg_id={}, replaying cached response", incoming.message_id);
            return Ok(true);
        }
        self.operation = incoming.operation.clone();
        self.confirmable = incoming.confirmable;
        self.uri_path.clear();
        self.uri_path.push_str(incoming.uri_path);
        self.content_format = incoming.content_format;
        self.handler = handler;
        self.in_buf.clear();
        self.in_buf.extend_from_slice(incoming.payload);
        self.out_buf.clear();

        self.ctx.direction = Direction::ServerInitiated;
        self.ctx.token = incoming.token;
        self.ctx.message_id = incoming.message_id;
        self.ctx.retry_count = 0;
        self.ctx.blocks = BlockProgress { block1: incoming.block1, block2: None };
        self.ctx.deadline_ms = now_ms + crate::types::DEFAULT_SERVER_REQUEST_TIMEOUT_MS;

        if incoming.block1.map(|b| b.more).unwrap_or(false) {
            self.ctx.state = ExchangeState::WaitingMsg;
        } else {
            if !self.in_buf.is_empty() {
                self.handler.read_payload(dm, &self.in_buf)?;
            }
            self.last_server_msg_id = Some(self.ctx.message_id);
            self.ctx.state = ExchangeState::MsgToSend;
        }
        Ok(false)
    }

    /// Advances the exchange. `incoming` is `Some` exactly when a datagram
    /// matching this engine's token/message-id arrived since the last call.
    pub fn process<'a>(
        &'a mut self,
        now_ms: u64,
        incoming: Option<&Message<'_>>,
        dm: &mut dyn DataModel,
    ) -> Result<EngineOutput<'a>, CoreError> {
        if let Some(msg) = incoming {
            self.on_incoming(now_ms, msg, dm)?;
        }

        match self.ctx.state {
            ExchangeState::Finished => Ok(EngineOutput::Idle),
            ExchangeState::MsgToSend => self.build_outgoing(now_ms, dm),
            ExchangeState::WaitingSendConfirmation => {
                // Host confirms the send out-of-band; treat processing-delay
                // elapse as an implicit confirmation so the engine never stalls.
                if now_ms >= self.ctx.deadline_ms {
                    match self.ctx.direction {
                        // The response we just sent IS the reply; nothing
                        // more is expected from the server for this exchange.
                        Direction::ServerInitiated => {
                            self.finish(dm, None)?;
                            return Ok(EngineOutput::Idle);
                        }
                        Direction::ClientInitiated => {
                            self.ctx.state = ExchangeState::WaitingMsg;
                            self.arm_retransmit_deadline(now_ms);
                        }
                    }
                }
                Ok(EngineOutput::WaitUntil(self.ctx.deadline_ms))
            }
            ExchangeState::WaitingMsg => {
                if now_ms >= self.ctx.deadline_ms {
                    self.on_timeout(now_ms, dm)
                } else {
                    Ok(EngineOutput::WaitUntil(self.ctx.deadline_ms))
                }
            }
        }
    }

    /// Aborts whatever exchange is in flight, invoking the handler's
    /// completion with no response so it can close out any resources it
    /// opened (e.g. a forced restart/bootstrap mid-exchange, §4.1/§5).
    pub fn terminate(&mut self, dm: &mut dyn DataModel) {
        if !self.ctx.is_idle() {
            if let Err(e) = self.handler.completion(dm, None) {
                lwm2m_warn!("handler completion failed during terminate: {e}");
            }
        }
        self.ctx.state = ExchangeState::Finished;
        self.out_buf.clear();
        self.in_buf.clear();
    }

    fn initial_timeout(&self, rng: &mut dyn Rng) -> u64 {
        let base = self.ctx.tx_params.ack_timeout_ms;
        let span = (self.ctx.tx_params.ack_random_factor - 1.0).max(0.0);
        let jitter = if span > 0.0 {
            let r = (rng.next_u32() as f64) / (u32::MAX as f64);
            (base as f64 * span * r) as u64
        } else {
            0
        };
        base + jitter
    }

    fn arm_retransmit_deadline(&mut self, now_ms: u64) {
        // Binary exponential backoff per RFC 7252 §4.2.
        let timeout = self.ctx.current_timeout_ms << self.ctx.retry_count.min(16);
        self.ctx.current_timeout_ms = timeout;
        self.ctx.deadline_ms = now_ms + timeout;
    }

    fn on_timeout(&mut self, now_ms: u64, dm: &mut dyn DataModel) -> Result<EngineOutput<'_>, CoreError> {
        match self.ctx.direction {
            Direction::ServerInitiated => {
                lwm2m_warn!("server-initiated exchange idle-timed-out, abandoning");
                self.finish(dm, None)?;
                Ok(EngineOutput::Idle)
            }
            Direction::ClientInitiated => {
                if matches!(self.confirmable, Confirmable::NonCon) {
                    self.finish(dm, None)?;
                    return Ok(EngineOutput::Idle);
                }
                if self.ctx.retry_count >= self.ctx.tx_params.max_retransmit {
                    lwm2m_warn!("exchange exhausted {} retransmits", self.ctx.retry_count);
                    self.finish(dm, None)?;
                    return Ok(EngineOutput::Idle);
                }
                self.ctx.retry_count += 1;
                self.ctx.state = ExchangeState::MsgToSend;
                self.build_outgoing(now_ms, dm)
            }
        }
    }

    fn on_incoming(&mut self, now_ms: u64, msg: &Message<'_>, dm: &mut dyn DataModel) -> Result<(), CoreError> {
        if matches!(self.ctx.direction, Direction::ClientInitiated) && self.ctx.state == ExchangeState::WaitingMsg {
            // RFC 7252 §5.2.2 separate response: an empty ACK only silences
            // our retransmissions, the real response is still to come,
            // correlated by token rather than message id. Re-arm the wait
            // instead of treating the ACK itself as the reply.
            if matches!(msg.operation, Operation::CoapEmpty) && msg.code == CoapCode::EMPTY && msg.message_id == self.ctx.message_id {
                lwm2m_debug!("got empty ACK, awaiting separate response");
                self.ctx.retry_count = 0;
                self.ctx.deadline_ms = now_ms + crate::types::DEFAULT_SERVER_REQUEST_TIMEOUT_MS;
                return Ok(());
            }
            // A RST carries no token (RFC 7252 §4.2/§4.3), so it has to be
            // matched by message id before the token check below would drop it.
            if matches!(msg.operation, Operation::CoapReset) && msg.message_id == self.ctx.message_id {
                self.finish(dm, Some(msg))?;
                return Ok(());
            }
        }

        if msg.token != self.ctx.token {
            lwm2m_debug!("dropping message with mismatched token");
            return Ok(());
        }
        self.response_code = msg.code;

        // A server-initiated exchange never calls `finish` from here: once
        // the request is fully received the response still has to be built
        // and sent, which happens through `MsgToSend`/`WaitingSendConfirmation`.
        if matches!(self.ctx.direction, Direction::ServerInitiated) {
            if let Some(b1) = msg.block1 {
                self.ctx.blocks.block1 = Some(b1);
                self.in_buf.extend_from_slice(msg.payload);
                self.ctx.message_id = msg.message_id;
                if b1.more {
                    return Ok(());
                }
            }
            if !self.in_buf.is_empty() {
                self.handler.read_payload(dm, &self.in_buf)?;
            }
            self.last_server_msg_id = Some(self.ctx.message_id);
            self.ctx.state = ExchangeState::MsgToSend;
            return Ok(());
        }

        // Still mid a BLOCK1 upload if the block we last sent had `more`
        // set: a 2.31 Continue means the server accepted it and wants the
        // next one, anything else ends the exchange with that response.
        if let Some(sent) = self.ctx.blocks.block1 {
            if sent.more {
                if msg.code == CoapCode::CONTINUE {
                    self.ctx.blocks.block1 = Some(BlockOption { number: sent.number + 1, size: sent.size, more: false });
                    self.ctx.message_id = self.ctx.message_id.wrapping_add(1);
                    // The next outgoing block is still a fresh request, not
                    // a reply, so the codec must derive its method code
                    // again rather than re-encoding this 2.31 as the code.
                    self.response_code = CoapCode::EMPTY;
                    self.ctx.state = ExchangeState::MsgToSend;
                    return Ok(());
                }
                self.finish(dm, Some(msg))?;
                return Ok(());
            }
        }

        if let Some(b2) = msg.block2 {
            if let Some(prev) = self.ctx.blocks.block2 {
                if b2.size != prev.size {
                    lwm2m_debug!("dropping message with mismatched block2 size");
                    return Ok(());
                }
                if b2.number != prev.number + 1 {
                    lwm2m_debug!("dropping out-of-sequence block2");
                    return Ok(());
                }
            }
            self.in_buf.extend_from_slice(msg.payload);
            self.ctx.blocks.block2 = Some(b2);
            if b2.more {
                self.ctx.message_id = self.ctx.message_id.wrapping_add(1);
                self.response_code = CoapCode::EMPTY;
                self.ctx.state = ExchangeState::MsgToSend;
                return Ok(());
            }
        } else if !msg.payload.is_empty() {
            self.in_buf.clear();
            self.in_buf.extend_from_slice(msg.payload);
        }

        if !self.in_buf.is_empty() {
            self.handler.read_payload(dm, &self.in_buf)?;
        }

        self.finish(dm, Some(msg))?;
        Ok(())
    }

    fn build_outgoing(&mut self, now_ms: u64, dm: &mut dyn DataModel) -> Result<EngineOutput<'_>, CoreError> {
        let block_size = self.ctx.blocks.block1.map(|b| b.size as usize).unwrap_or(DEFAULT_BLOCK_SIZE);
        let block_number = self.ctx.blocks.block1.map(|b| b.number).unwrap_or(0);
        let offset = block_number as usize * block_size;

        let (slice, more) = self.handler.write_payload(dm, offset, block_size)?;
        self.out_buf.clear();
        self.out_buf.extend_from_slice(slice);

        // A block1 option is only attached once the payload either didn't
        // fit in one block (`more`) or this is a later block of one that
        // didn't (`block_number > 0`); a payload that fits in the first
        // block stays a plain, non-block-wise request.
        self.ctx.blocks.block1 = if more || block_number > 0 {
            Some(BlockOption { number: block_number, size: block_size as u16, more })
        } else {
            None
        };

        let mut msg = Message::request(self.operation.clone(), self.uri_path.as_str(), self.confirmable);
        msg.message_id = self.ctx.message_id;
        msg.token = self.ctx.token;
        msg.content_format = self.content_format;
        msg.block1 = self.ctx.blocks.block1;
        msg.block2 = self.ctx.blocks.block2;
        msg.payload = &self.out_buf;
        msg.code = match self.ctx.direction {
            Direction::ServerInitiated => self.handler.response_code(),
            Direction::ClientInitiated => self.response_code,
        };

        self.ctx.state = ExchangeState::WaitingSendConfirmation;
        self.ctx.deadline_ms = now_ms + self.ctx.tx_params.ack_timeout_ms.min(crate::types::PROCESSING_DELAY_MS);
        Ok(EngineOutput::Send(msg))
    }

    fn finish(&mut self, dm: &mut dyn DataModel, response: Option<&Message<'_>>) -> Result<(), CoreError> {
        self.handler.completion(dm, response)?;
        self.ctx.state = ExchangeState::Finished;
        Ok(())
    }
}
