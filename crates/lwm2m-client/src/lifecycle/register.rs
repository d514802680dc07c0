// crates/lwm2m-client/src/lifecycle/register.rs

//! Builds the Register/Update/Deregister messages (LwM2M core spec §6.2)
//! and extracts the Location-Path the Register response carries.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::common::LocationPath;
use crate::dm::DataModel;
use crate::error::{CoreError, DmError};
use crate::exchange::ExchangeHandler;
use crate::message::{Confirmable, Message};
use crate::types::{Operation, RegisterAttributes};

/// Builds a Register request (`POST /rd?ep=...&lt=...&lwm2m=...&b=...`).
/// The query string itself is assembled by the transport-facing codec; this
/// layer only fixes the operation's attributes.
pub fn build_register<'a>(endpoint_uri: &'a str, attrs: RegisterAttributes) -> Message<'a> {
    let mut msg = Message::request(Operation::Register(attrs), endpoint_uri, Confirmable::Con);
    msg.content_format = Some(crate::types::ContentFormat::LinkFormat);
    msg
}

/// Builds an Update request (`POST /{location-path}`) against the
/// Location-Path the Register response returned.
pub fn build_update<'a>(location: &'a LocationPath, attrs: RegisterAttributes, uri_buf: &'a str) -> Message<'a> {
    let _ = location; // path text is rendered by the caller into `uri_buf`
    Message::request(Operation::Update(attrs), uri_buf, Confirmable::Con)
}

/// Builds a Deregister request (`DELETE /{location-path}`).
pub fn build_deregister(uri_buf: &str) -> Message<'_> {
    Message::request(Operation::Deregister, uri_buf, Confirmable::Con)
}

/// Extracts the Location-Path option list from a Register response. Per the
/// LwM2M core spec this is always at least one segment (conventionally `rd`
/// plus a session id).
pub fn location_path_from_response(response: &Message<'_>) -> Result<LocationPath, CoreError> {
    if response.location_path.is_empty() {
        return Err(CoreError::Internal("Register response carried no Location-Path"));
    }
    Ok(response.location_path.clone())
}

/// Outcome of one Register/Update exchange, shared between the
/// `RegisterHandler` boxed into the exchange engine and the lifecycle code
/// that started the exchange.
#[derive(Debug, Clone, Default)]
pub struct RegisterOutcome {
    pub location_path: Option<LocationPath>,
    pub failed: bool,
}

/// Serialises the endpoint's Object/Instance list as CoRE Link-Format
/// (RFC 6690) for the Register payload body, reading availability straight
/// out of the data model.
pub struct RegisterHandler {
    outcome: Rc<RefCell<RegisterOutcome>>,
    rendered: Vec<u8>,
}

impl RegisterHandler {
    pub fn new(outcome: Rc<RefCell<RegisterOutcome>>) -> Self {
        RegisterHandler { outcome, rendered: Vec::new() }
    }
}

impl ExchangeHandler for RegisterHandler {
    fn read_payload(&mut self, _dm: &mut dyn DataModel, _payload: &[u8]) -> Result<(), DmError> {
        Ok(())
    }

    fn write_payload<'a>(&'a mut self, dm: &mut dyn DataModel, offset: usize, max_len: usize) -> Result<(&'a [u8], bool), DmError> {
        if offset == 0 {
            self.rendered.clear();
            let count = dm.get_readable_res_count("/")?;
            for i in 0..count {
                let entry = dm.get_read_entry("/", i)?;
                if entry.is_end() {
                    break;
                }
                self.rendered.extend_from_slice(b"</");
                self.rendered.extend_from_slice(&itoa_buf(entry.id));
                self.rendered.extend_from_slice(b">,");
            }
            if self.rendered.ends_with(b",") {
                self.rendered.pop();
            }
        }
        Ok(crate::exchange::block_slice(&self.rendered, offset, max_len))
    }

    fn completion(&mut self, _dm: &mut dyn DataModel, response: Option<&Message<'_>>) -> Result<(), CoreError> {
        let mut outcome = self.outcome.borrow_mut();
        match response {
            Some(resp) if !resp.code.is_error() => {
                outcome.location_path = location_path_from_response(resp).ok();
                outcome.failed = false;
            }
            _ => outcome.failed = true,
        }
        Ok(())
    }
}

/// Minimal decimal formatter: avoids pulling in `itoa` for one digit-count use.
fn itoa_buf(mut value: i32) -> Vec<u8> {
    if value == 0 {
        return alloc::vec![b'0'];
    }
    let mut digits = Vec::new();
    let negative = value < 0;
    if negative {
        value = -value;
    }
    while value > 0 {
        digits.push(b'0' + (value % 10) as u8);
        value /= 10;
    }
    if negative {
        digits.push(b'-');
    }
    digits.reverse();
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_uses_link_format() {
        let msg = build_register("/rd", RegisterAttributes { lifetime_s: Some(300), ..Default::default() });
        assert_eq!(msg.content_format, Some(crate::types::ContentFormat::LinkFormat));
        assert!(matches!(msg.operation, Operation::Register(_)));
    }

    #[test]
    fn location_path_extraction_rejects_empty() {
        let msg = Message::request(Operation::Response, "/rd/0", Confirmable::Con);
        assert!(location_path_from_response(&msg).is_err());
    }
}
