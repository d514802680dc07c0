// crates/lwm2m-client/src/send.rs

//! The LwM2M Send queue (§4.9): a bounded FIFO of client-initiated reports,
//! chained into the exchange engine one at a time.

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::dm::DataModel;
use crate::error::{CoreError, DmError};
use crate::exchange::ExchangeHandler;
use crate::message::Message;
use crate::types::{ContentFormat, Ssid};

/// Reserved id meaning "every in-flight Send request" for a bulk abort
/// (`core/lwm2m_send.c`'s `ANJ_ID_ALL`); never handed out by `register`.
pub const ID_ALL: u16 = u16::MAX;

/// One queued client-initiated report.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub id: u16,
    pub ssid: Ssid,
    pub paths: Vec<String>,
    pub content_format: Option<ContentFormat>,
}

/// Bounded FIFO of pending `SendRequest`s.
pub struct SendQueue {
    capacity: usize,
    requests: Vec<SendRequest>,
    next_id: u16,
    abort_in_progress: bool,
}

impl SendQueue {
    pub fn new(capacity: usize) -> Self {
        SendQueue { capacity, requests: Vec::new(), next_id: 1, abort_in_progress: false }
    }

    /// Allocates the next id, wrapping past zero and [`ID_ALL`] (both
    /// reserved: zero is never a valid id, `ID_ALL` addresses every request).
    fn allocate_id(&mut self) -> u16 {
        let id = self.next_id;
        self.next_id = match self.next_id.wrapping_add(1) {
            0 => 1,
            v if v == ID_ALL => 1,
            v => v,
        };
        id
    }

    /// Registers a new Send request. Requires the client be REGISTERED and
    /// the Server Object's Mute Send resource (`/1/x/23`) false.
    pub fn register(&mut self, ssid: Ssid, paths: Vec<String>, content_format: Option<ContentFormat>, is_registered: bool, mute_send: bool) -> Result<u16, CoreError> {
        if !is_registered {
            return Err(CoreError::NotRegistered);
        }
        if mute_send {
            return Err(CoreError::SendMuted);
        }
        if self.requests.len() >= self.capacity {
            return Err(CoreError::SendQueueFull);
        }
        let id = self.allocate_id();
        self.requests.push(SendRequest { id, ssid, paths, content_format });
        Ok(id)
    }

    pub fn has_work(&self) -> bool {
        !self.requests.is_empty()
    }

    pub fn has_work_for(&self, ssid: Ssid) -> bool {
        self.requests.iter().any(|r| r.ssid == ssid)
    }

    /// Head request destined for `ssid`, if the front-of-queue one is (FIFO
    /// across the whole queue; a request for a different server blocks
    /// service of a later one for `ssid` until it is handled).
    pub fn peek_for(&self, ssid: Ssid) -> Option<&SendRequest> {
        self.requests.first().filter(|r| r.ssid == ssid)
    }

    pub fn peek(&self) -> Option<&SendRequest> {
        self.requests.first()
    }

    /// Removes and returns the head request once its exchange has finished.
    pub fn complete_head(&mut self) -> Option<SendRequest> {
        if self.requests.is_empty() {
            None
        } else {
            Some(self.requests.remove(0))
        }
    }

    /// Aborts one request by id, compacting the queue to preserve FIFO order
    /// of the remainder.
    pub fn abort_one(&mut self, id: u16) -> Option<SendRequest> {
        let pos = self.requests.iter().position(|r| r.id == id)?;
        Some(self.requests.remove(pos))
    }

    /// Aborts every pending request, returning them in FIFO order so the
    /// caller can invoke each one's completion handler exactly once.
    pub fn abort_all(&mut self) -> Vec<SendRequest> {
        self.abort_in_progress = true;
        let drained = self.requests.drain(..).collect();
        self.abort_in_progress = false;
        drained
    }

    /// True while `abort_all` is unwinding; guards re-entrant `send_abort`
    /// calls from inside a completion handler (§5).
    pub fn abort_in_progress(&self) -> bool {
        self.abort_in_progress
    }
}

/// Renders a Send request's resource values as `path=value;` records — the
/// same stand-in plain encoding `observe::NotifyHandler` uses, pending an
/// external SenML/OMA-CBOR encoder.
fn render_plain_records(dm: &mut dyn DataModel, paths: &[String], out: &mut Vec<u8>) -> Result<(), DmError> {
    out.clear();
    for path in paths {
        let value = dm.get_resource_value(path)?;
        out.extend_from_slice(path.as_bytes());
        out.push(b'=');
        match value {
            crate::dm::ResourceValue::String(s) => out.extend_from_slice(s.as_bytes()),
            crate::dm::ResourceValue::Opaque(bytes) => out.extend_from_slice(&bytes),
            crate::dm::ResourceValue::Bool(b) => out.extend_from_slice(if b { b"true" } else { b"false" }),
            other => {
                if let Some(v) = other.as_f64() {
                    out.extend_from_slice(alloc::format!("{v}").as_bytes());
                }
            }
        }
        out.push(b';');
    }
    Ok(())
}

/// Outcome of one Send exchange, shared with whatever owns the queue so it
/// can decide when to pop the completed request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOutcome {
    pub finished: bool,
    pub failed: bool,
}

/// Builds and tracks completion of one `INF_CON_SEND`/`INF_NON_CON_SEND` exchange.
pub struct SendHandler {
    paths: Vec<String>,
    rendered: Vec<u8>,
    outcome: Rc<RefCell<SendOutcome>>,
}

impl SendHandler {
    pub fn new(paths: Vec<String>, outcome: Rc<RefCell<SendOutcome>>) -> Self {
        SendHandler { paths, rendered: Vec::new(), outcome }
    }
}

impl ExchangeHandler for SendHandler {
    fn read_payload(&mut self, _dm: &mut dyn DataModel, _payload: &[u8]) -> Result<(), DmError> {
        Ok(())
    }

    fn write_payload<'a>(&'a mut self, dm: &mut dyn DataModel, offset: usize, max_len: usize) -> Result<(&'a [u8], bool), DmError> {
        if offset == 0 {
            render_plain_records(dm, &self.paths, &mut self.rendered)?;
        }
        Ok(crate::exchange::block_slice(&self.rendered, offset, max_len))
    }

    fn completion(&mut self, _dm: &mut dyn DataModel, response: Option<&Message<'_>>) -> Result<(), CoreError> {
        let mut outcome = self.outcome.borrow_mut();
        outcome.finished = true;
        outcome.failed = !matches!(response, Some(r) if !r.code.is_error());
        Ok(())
    }
}
