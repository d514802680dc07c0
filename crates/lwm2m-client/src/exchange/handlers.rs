// crates/lwm2m-client/src/exchange/handlers.rs

use alloc::boxed::Box;

use crate::dm::DataModel;
use crate::error::{CoreError, DmError};
use crate::message::Message;
use crate::types::CoapCode;

/// Per-exchange behaviour vtable: what to do with an incoming block of
/// payload, what to send for the next outgoing block, and what happens when
/// the exchange finishes.
///
/// One `ExchangeHandler` implementation exists per operation family (plain
/// read/write, registration, bootstrap, observe/notify, send); the engine
/// itself only drives state transitions and timing.
pub trait ExchangeHandler {
    /// Called once per incoming payload block (or once, for a non-block-wise
    /// message) with the data model available for the handler to act on.
    fn read_payload(&mut self, dm: &mut dyn DataModel, payload: &[u8]) -> Result<(), DmError>;

    /// Called when the engine needs the next outgoing payload block;
    /// `offset`/`max_len` bound the slice the caller may return. The `bool`
    /// reports whether more blocks remain beyond this one, driving BLOCK1
    /// upload continuation in the engine.
    fn write_payload<'a>(
        &'a mut self,
        dm: &mut dyn DataModel,
        offset: usize,
        max_len: usize,
    ) -> Result<(&'a [u8], bool), DmError>;

    /// Called exactly once when the exchange reaches `ExchangeState::Finished`,
    /// with the final response message if one was received.
    fn completion(&mut self, dm: &mut dyn DataModel, response: Option<&Message<'_>>) -> Result<(), CoreError>;

    /// The CoAP response code to send for a server-initiated exchange, read
    /// once the handler's `write_payload` has run. Irrelevant for
    /// client-initiated exchanges, where the codec derives the request's
    /// method code from `Message::operation` instead.
    fn response_code(&self) -> CoapCode {
        CoapCode::CONTENT
    }
}

/// A handler for exchanges that carry no payload in either direction
/// (DELETE, EXECUTE with empty args, CoAP pings): every method is a no-op.
pub struct NoOpHandler;

impl ExchangeHandler for NoOpHandler {
    fn read_payload(&mut self, _dm: &mut dyn DataModel, _payload: &[u8]) -> Result<(), DmError> {
        Ok(())
    }

    fn write_payload<'a>(
        &'a mut self,
        _dm: &mut dyn DataModel,
        _offset: usize,
        _max_len: usize,
    ) -> Result<(&'a [u8], bool), DmError> {
        Ok((&[], false))
    }

    fn completion(&mut self, _dm: &mut dyn DataModel, _response: Option<&Message<'_>>) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Slices `rendered` into a fixed-size block `[offset, offset+max_len)`,
/// reporting whether bytes remain beyond the returned slice. Shared by every
/// handler that renders its whole payload up front and hands it out one
/// block at a time.
pub fn block_slice(rendered: &[u8], offset: usize, max_len: usize) -> (&[u8], bool) {
    if offset >= rendered.len() {
        return (&[], false);
    }
    let end = core::cmp::min(offset + max_len, rendered.len());
    (&rendered[offset..end], end < rendered.len())
}

/// Lets `Anj` hold one boxed handler per in-flight exchange rather than
/// being generic over every operation's concrete handler type.
impl ExchangeHandler for Box<dyn ExchangeHandler> {
    fn read_payload(&mut self, dm: &mut dyn DataModel, payload: &[u8]) -> Result<(), DmError> {
        (**self).read_payload(dm, payload)
    }

    fn write_payload<'a>(
        &'a mut self,
        dm: &mut dyn DataModel,
        offset: usize,
        max_len: usize,
    ) -> Result<(&'a [u8], bool), DmError> {
        (**self).write_payload(dm, offset, max_len)
    }

    fn completion(&mut self, dm: &mut dyn DataModel, response: Option<&Message<'_>>) -> Result<(), CoreError> {
        (**self).completion(dm, response)
    }

    fn response_code(&self) -> CoapCode {
        (**self).response_code()
    }
}
