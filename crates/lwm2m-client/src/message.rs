// crates/lwm2m-client/src/message.rs

//! The CoAP-level message model shared by the exchange engine, lifecycle and
//! observation modules. Wire encoding/decoding (RFC 7252 §3 framing) is an
//! external boundary: this crate defines the `Codec` trait a host or
//! companion crate implements, but carries no concrete encoder.

use crate::common::{LocationPath, Token};
use crate::error::CoreError;
use crate::types::{CoapCode, ContentFormat, Operation};

/// Confirmability of a CoAP message (RFC 7252 §2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmable {
    Con,
    NonCon,
}

/// A RFC 7959 block option: block number, negotiated size and the
/// more-blocks-follow flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    pub number: u32,
    pub size: u16,
    pub more: bool,
}

impl BlockOption {
    pub fn first(size: u16) -> Self {
        BlockOption { number: 0, size, more: false }
    }

    /// Encodes as the 1-3 byte SZX-packed value used on the wire (RFC 7959 §2.2).
    pub fn szx(&self) -> Result<u8, CoreError> {
        match self.size {
            16 => Ok(0),
            32 => Ok(1),
            64 => Ok(2),
            128 => Ok(3),
            256 => Ok(4),
            512 => Ok(5),
            1024 => Ok(6),
            _ => Err(CoreError::InvalidArgument("block size not a power of two in [16, 1024]")),
        }
    }
}

/// One CoAP/LwM2M protocol message: the unit the exchange engine and
/// lifecycle modules build, send and interpret.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<'a> {
    pub operation: Operation,
    pub message_id: u16,
    pub token: Token,
    pub confirmable: Confirmable,
    pub uri_path: &'a str,
    pub content_format: Option<ContentFormat>,
    pub accept_format: Option<ContentFormat>,
    pub block1: Option<BlockOption>,
    pub block2: Option<BlockOption>,
    pub observe: Option<u32>,
    pub location_path: LocationPath,
    pub code: CoapCode,
    pub payload: &'a [u8],
}

impl<'a> Message<'a> {
    /// Builds an empty request shell for `operation`, with everything else
    /// at its default/absent value. Callers fill in what the operation needs.
    pub fn request(operation: Operation, uri_path: &'a str, confirmable: Confirmable) -> Self {
        Message {
            operation,
            message_id: 0,
            token: Token::EMPTY,
            confirmable,
            uri_path,
            content_format: None,
            accept_format: None,
            block1: None,
            block2: None,
            observe: None,
            location_path: LocationPath::empty(),
            code: CoapCode::EMPTY,
            payload: &[],
        }
    }

    pub fn is_request(&self) -> bool {
        !matches!(self.operation, Operation::Response | Operation::CoapEmpty | Operation::CoapReset)
    }
}

/// External wire-codec boundary: host code or a companion crate supplies the
/// concrete CBOR/SenML/TLV or RFC 7252 binary framing.
pub trait Codec {
    /// Serializes `message` into `buffer`, returning the number of bytes written.
    fn encode(&self, message: &Message<'_>, buffer: &mut [u8]) -> Result<usize, CoreError>;

    /// Parses a datagram into a `Message` borrowing from `buffer`.
    ///
    /// Takes `buffer` mutably so a multi-segment Uri-Path (each segment its
    /// own CoAP option, RFC 7252 §3.1) can be reassembled in place into a
    /// single slash-joined `&'a str` without an allocation: the joined form
    /// is never longer than the option-framed original, so it always fits.
    fn decode<'a>(&self, buffer: &'a mut [u8]) -> Result<Message<'a>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_option_szx_round_trips_valid_sizes() {
        assert_eq!(BlockOption::first(16).szx(), Ok(0));
        assert_eq!(BlockOption::first(1024).szx(), Ok(6));
    }

    #[test]
    fn block_option_szx_rejects_non_power_of_two() {
        let b = BlockOption { number: 0, size: 100, more: false };
        assert!(b.szx().is_err());
    }

    #[test]
    fn request_shell_has_no_payload_or_token() {
        let m = Message::request(Operation::DmRead, "/3/0/1", Confirmable::Con);
        assert!(m.payload.is_empty());
        assert!(m.token.is_empty());
        assert!(m.is_request());
    }
}
