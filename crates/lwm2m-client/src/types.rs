// crates/lwm2m-client/src/types.rs

//! Primitive aliases, protocol constants and the wire-level enums shared by
//! every module: the foundation layer everything else imports from.

use core::convert::TryFrom;

/// Short Server ID. `65535` is reserved by LwM2M as "any server".
pub type Ssid = u16;

/// Reserved SSID meaning "any server" (LwM2M core spec, §6.1).
pub const SSID_ANY: Ssid = 65535;

/// SSID used internally to address the Bootstrap Server, which has no
/// registered SSID of its own.
pub const SSID_BOOTSTRAP: Ssid = 0;

/// Maximum length in bytes of a CoAP token (RFC 7252, §3).
pub const MAX_TOKEN_LEN: usize = 8;

/// Smallest permitted CoAP block-wise transfer size (RFC 7959).
pub const MIN_BLOCK_SIZE: usize = 16;

/// Largest permitted CoAP block-wise transfer size (RFC 7959).
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Bound on the number of location-path segments stored from a REGISTER response.
pub const MAX_LOCATION_PATHS: usize = 4;

/// Bound on the length of a single stored location-path segment.
pub const MAX_LOCATION_PATH_SIZE: usize = 32;

/// Bound on the number of simultaneously active observations (plain + composite members).
pub const MAX_OBSERVATIONS: usize = 32;

/// Bound on the number of stored Write-Attributes entries.
pub const MAX_WRITE_ATTRIBUTES: usize = 32;

/// RFC 7252 host-level transmit-completion budget: the time the host may
/// spend turning a confirmable message into an on-wire send before the
/// exchange gives up and fails with a timeout.
pub const PROCESSING_DELAY_MS: u64 = 2000;

/// Default server-initiated-exchange idle deadline (time to wait for the next
/// expected block of a server request).
pub const DEFAULT_SERVER_REQUEST_TIMEOUT_MS: u64 = 50_000;

/// Default bootstrap-finish timeout (spec.md §4.3).
pub const DEFAULT_BOOTSTRAP_TIMEOUT_S: u32 = 247;

/// Observe option counter wraps at 2^24 (RFC 7641).
pub const OBSERVE_NUMBER_MODULO: u32 = 1 << 24;

/// IANA CoRE Parameters content-format identifiers used by this stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContentFormat {
    PlainText = 0,
    LinkFormat = 40,
    OpaqueStream = 42,
    Cbor = 60,
    SenMlJson = 110,
    SenMlCbor = 112,
    SenMlEtchJson = 320,
    SenMlEtchCbor = 322,
    OmaLwm2mTlv = 11542,
    OmaLwm2mJson = 11543,
    OmaLwm2mCbor = 11544,
}

/// Error for a content-format value outside the IANA CoRE parameters this stack knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownContentFormat(pub u16);

impl TryFrom<u16> for ContentFormat {
    type Error = UnknownContentFormat;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ContentFormat::PlainText,
            40 => ContentFormat::LinkFormat,
            42 => ContentFormat::OpaqueStream,
            60 => ContentFormat::Cbor,
            110 => ContentFormat::SenMlJson,
            112 => ContentFormat::SenMlCbor,
            320 => ContentFormat::SenMlEtchJson,
            322 => ContentFormat::SenMlEtchCbor,
            11542 => ContentFormat::OmaLwm2mTlv,
            11543 => ContentFormat::OmaLwm2mJson,
            11544 => ContentFormat::OmaLwm2mCbor,
            other => return Err(UnknownContentFormat(other)),
        })
    }
}

/// A CoAP request/response code, stored as `(class << 5) | detail` per RFC 7252 §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoapCode(pub u8);

impl CoapCode {
    pub const EMPTY: CoapCode = CoapCode(0x00);
    pub const GET: CoapCode = CoapCode(0x01);
    pub const POST: CoapCode = CoapCode(0x02);
    pub const PUT: CoapCode = CoapCode(0x03);
    pub const DELETE: CoapCode = CoapCode(0x04);
    pub const FETCH: CoapCode = CoapCode(0x05);
    pub const IPATCH: CoapCode = CoapCode(0x07);

    pub const CREATED: CoapCode = CoapCode(0x41); // 2.01
    pub const DELETED: CoapCode = CoapCode(0x42); // 2.02
    pub const VALID: CoapCode = CoapCode(0x43); // 2.03
    pub const CHANGED: CoapCode = CoapCode(0x44); // 2.04
    pub const CONTENT: CoapCode = CoapCode(0x45); // 2.05
    pub const CONTINUE: CoapCode = CoapCode(0x5F); // 2.31

    pub const BAD_REQUEST: CoapCode = CoapCode(0x80); // 4.00
    pub const UNAUTHORIZED: CoapCode = CoapCode(0x81); // 4.01
    pub const NOT_FOUND: CoapCode = CoapCode(0x84); // 4.04
    pub const METHOD_NOT_ALLOWED: CoapCode = CoapCode(0x85); // 4.05
    pub const NOT_ACCEPTABLE: CoapCode = CoapCode(0x86); // 4.06
    pub const UNSUPPORTED_CONTENT_FORMAT: CoapCode = CoapCode(0x8F); // 4.15

    pub const INTERNAL_SERVER_ERROR: CoapCode = CoapCode(0xA0); // 5.00
    pub const NOT_IMPLEMENTED: CoapCode = CoapCode(0xA1); // 5.01
    pub const SERVICE_UNAVAILABLE: CoapCode = CoapCode(0xA3); // 5.03

    /// True for any response code in class 4.xx or 5.xx.
    pub fn is_error(self) -> bool {
        self.0 >= Self::BAD_REQUEST.0
    }

    pub fn class(self) -> u8 {
        self.0 >> 5
    }
}

/// Every CoAP/LwM2M operation kind the exchange engine and lifecycle
/// submodules can drive. Per-variant payload avoids an attributes-union
/// indexed by operation kind (see DESIGN.md).
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Register(RegisterAttributes),
    Update(RegisterAttributes),
    Deregister,
    BootstrapRequest { preferred_content_format: ContentFormat },
    BootstrapFinish,
    DmRead,
    DmReadComposite,
    DmDiscover(DiscoverAttributes),
    DmWriteReplace,
    DmWritePartial,
    DmWriteComposite,
    DmExecute,
    DmCreate(CreateAttributes),
    DmDelete,
    InfObserve(NotificationAttributes),
    InfObserveComposite(NotificationAttributes),
    InfCancelObserve,
    InfCancelObserveComposite,
    InfConSend,
    InfNonConSend,
    InfConNotify(NotificationAttributes),
    InfNonConNotify(NotificationAttributes),
    InfInitialNotify(NotificationAttributes),
    Response,
    CoapEmpty,
    CoapReset,
    CoapPingUdp,
}

/// Per-operation attributes carried by `Operation::Register`/`Update`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterAttributes {
    pub lifetime_s: Option<u32>,
    pub lwm2m_version: Option<&'static str>,
    pub binding: Option<&'static str>,
    pub queue_mode: bool,
}

/// Per-operation attributes carried by `Operation::DmCreate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateAttributes {
    pub instance_id: Option<u16>,
}

/// Per-operation attributes carried by `Operation::DmDiscover`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiscoverAttributes {
    pub depth: Option<u8>,
}

/// Per-operation attributes carried by observe/notify operations: the
/// observe-option 24-bit sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NotificationAttributes {
    pub observe_number: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_format_round_trips_known_values() {
        assert_eq!(ContentFormat::try_from(112u16), Ok(ContentFormat::SenMlCbor));
        assert_eq!(ContentFormat::try_from(11544u16), Ok(ContentFormat::OmaLwm2mCbor));
        assert_eq!(ContentFormat::try_from(9999u16), Err(UnknownContentFormat(9999)));
    }

    #[test]
    fn coap_code_classifies_errors() {
        assert!(!CoapCode::CONTENT.is_error());
        assert!(CoapCode::BAD_REQUEST.is_error());
        assert!(CoapCode::SERVICE_UNAVAILABLE.is_error());
        assert_eq!(CoapCode::CHANGED.class(), 2);
        assert_eq!(CoapCode::NOT_FOUND.class(), 4);
    }
}
