// crates/lwm2m-client/src/error.rs

use crate::types::{CoapCode, UnknownContentFormat};
use core::fmt;

/// Portable error type for the LwM2M client core.
///
/// Kept as plain data (no heap payload beyond `&'static str`) so it stays
/// usable without an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// The provided buffer is too small for the operation.
    BufferTooShort,
    /// The message does not carry the token/message-id the exchange expects.
    UnsolicitedMessage,
    /// Accepted block number does not follow `0, 1, 2, …`.
    BlockOutOfSequence,
    /// Block size changed mid-exchange; late negotiation is not supported.
    BlockSizeChanged,
    /// `ack_random_factor < 1.0` or `ack_timeout_ms < 1000` was rejected by `set_udp_tx_params`.
    InvalidUdpTxParams,
    /// A content-format value outside the IANA CoRE parameters this stack knows.
    UnknownContentFormat(u16),
    /// Transport reported WOULD-BLOCK; not a failure, caller should retry next tick.
    WouldBlock,
    /// Transport reported a hard I/O failure.
    TransportError,
    /// No exchange is in flight where one was expected.
    NoActiveExchange,
    /// An exchange is already in flight (single-in-flight invariant violated).
    ExchangeBusy,
    /// The data-model facade rejected the operation.
    DataModel(DmError),
    /// Too many location-path segments, or one too long, for the storage bound.
    LocationPathOverflow,
    /// The send queue is full.
    SendQueueFull,
    /// No free observation slot (`MAX_OBSERVATIONS` reached).
    ObservationTableFull,
    /// No free Write-Attributes slot (`MAX_WRITE_ATTRIBUTES` reached).
    AttributeStoreFull,
    /// `(ssid, token)` does not name an active observation (or group).
    ObservationNotFound,
    /// A Send request was rejected because the Mute Send resource (`/1/x/23`) is true.
    SendMuted,
    /// A Send request was attempted while not REGISTERED.
    NotRegistered,
    /// Bootstrap finished but the data model failed validation (no Security+Server pair).
    DataModelValidation,
    /// Bootstrap-finish deadline elapsed.
    BootstrapTimeout,
    /// Notification attribute combination is invalid (e.g. `epmin >= epmax`).
    InvalidAttributes(&'static str),
    /// Programmer error: invalid argument to a public entry point.
    InvalidArgument(&'static str),
    /// Internal invariant violation.
    Internal(&'static str),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooShort => write!(f, "buffer too short"),
            Self::UnsolicitedMessage => write!(f, "message token/id does not match the active exchange"),
            Self::BlockOutOfSequence => write!(f, "block number out of sequence"),
            Self::BlockSizeChanged => write!(f, "block size changed mid-exchange"),
            Self::InvalidUdpTxParams => write!(f, "invalid UDP transmission parameters"),
            Self::UnknownContentFormat(v) => write!(f, "unknown content format {v}"),
            Self::WouldBlock => write!(f, "transport would block"),
            Self::TransportError => write!(f, "transport I/O error"),
            Self::NoActiveExchange => write!(f, "no active exchange"),
            Self::ExchangeBusy => write!(f, "an exchange is already in flight"),
            Self::DataModel(e) => write!(f, "data model error: {e}"),
            Self::LocationPathOverflow => write!(f, "location path too long or too many segments"),
            Self::SendQueueFull => write!(f, "send queue is full"),
            Self::ObservationTableFull => write!(f, "no free observation slot"),
            Self::AttributeStoreFull => write!(f, "no free write-attributes slot"),
            Self::ObservationNotFound => write!(f, "no active observation for that ssid/token"),
            Self::SendMuted => write!(f, "Mute Send resource is set"),
            Self::NotRegistered => write!(f, "client is not REGISTERED"),
            Self::DataModelValidation => write!(f, "bootstrap data model validation failed"),
            Self::BootstrapTimeout => write!(f, "bootstrap-finish deadline elapsed"),
            Self::InvalidAttributes(s) => write!(f, "invalid notification attributes: {s}"),
            Self::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
            Self::Internal(s) => write!(f, "internal error: {s}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for CoreError {}

impl From<UnknownContentFormat> for CoreError {
    fn from(e: UnknownContentFormat) -> Self {
        CoreError::UnknownContentFormat(e.0)
    }
}

impl From<DmError> for CoreError {
    fn from(e: DmError) -> Self {
        CoreError::DataModel(e)
    }
}

/// Errors the data-model facade (§4.8) can report. Mapped to CoAP codes at
/// the facade boundary — the exchange engine never interprets them beyond
/// "non-zero fails the exchange".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmError {
    BadRequest,
    Unauthorised,
    NotFound,
    MethodNotAllowed,
    UnsupportedContentFormat,
    NotImplemented,
    ServiceUnavailable,
    Internal,
}

impl fmt::Display for DmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BadRequest => "bad request",
            Self::Unauthorised => "unauthorised",
            Self::NotFound => "not found",
            Self::MethodNotAllowed => "method not allowed",
            Self::UnsupportedContentFormat => "unsupported content format",
            Self::NotImplemented => "not implemented",
            Self::ServiceUnavailable => "service unavailable",
            Self::Internal => "internal error",
        };
        write!(f, "{s}")
    }
}

impl DmError {
    /// Maps a data-model error to its CoAP response code, per spec.md §4.8.
    pub fn to_coap_code(self) -> CoapCode {
        match self {
            Self::BadRequest => CoapCode::BAD_REQUEST,
            Self::Unauthorised => CoapCode::UNAUTHORIZED,
            Self::NotFound => CoapCode::NOT_FOUND,
            Self::MethodNotAllowed => CoapCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedContentFormat => CoapCode::UNSUPPORTED_CONTENT_FORMAT,
            Self::NotImplemented => CoapCode::NOT_IMPLEMENTED,
            Self::ServiceUnavailable => CoapCode::SERVICE_UNAVAILABLE,
            Self::Internal => CoapCode::INTERNAL_SERVER_ERROR,
        }
    }
}
