// crates/lwm2m-client/src/dm.rs

//! The data-model facade: the external trait boundary between the protocol
//! core and whatever holds the actual Object/Instance/Resource tree (an
//! application's generated object store, a demo in-memory map, ...).
//!
//! The exchange engine and lifecycle modules only ever see this trait; they
//! never know how resources are stored.

use crate::error::DmError;
use crate::types::Ssid;
use alloc::string::String;
use alloc::vec::Vec;

/// Marks the end of a `get_read_entry` enumeration (mirrors a sentinel
/// record rather than an `Option` so the trait stays object-safe over FFI-ish
/// boundaries where that matters).
pub const LAST_RECORD: i32 = -1;

/// The resource type (LwM2M core spec Appendix C) as relevant to encoding
/// and condition evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    String,
    Integer,
    UnsignedInteger,
    Float,
    Boolean,
    Opaque,
    Objlnk,
    Time,
    Corelnk,
    Multiple,
}

/// A resource's (or resource instance's) current value, used both for
/// reads/writes through the facade and for observation condition evaluation
/// (§4.7 `lt`/`gt`/`st`).
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    String(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Opaque(Vec<u8>),
    ObjLink { object_id: u16, instance_id: u16 },
}

impl ResourceValue {
    /// Numeric projection used by the observation engine's `lt`/`gt`/`st`
    /// comparisons (§4.7). Non-numeric kinds have no ordering and return `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResourceValue::Int(v) => Some(*v as f64),
            ResourceValue::UInt(v) => Some(*v as f64),
            ResourceValue::Float(v) => Some(*v),
            ResourceValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

/// One row of a `get_read_entry` enumeration: either a concrete
/// object/instance/resource path component plus its value, or the
/// end-of-enumeration sentinel (`id == LAST_RECORD`).
#[derive(Debug, Clone, PartialEq)]
pub struct ReadEntry {
    pub id: i32,
    pub value: Option<ResourceValue>,
}

impl ReadEntry {
    pub const fn end() -> Self {
        ReadEntry { id: LAST_RECORD, value: None }
    }

    pub fn is_end(&self) -> bool {
        self.id == LAST_RECORD
    }
}

/// The facade a host application implements to expose its object/resource
/// tree to the protocol core.
///
/// `operation_begin`/`operation_end` bracket every DM-touching exchange so an
/// implementation can take a consistent snapshot (or a lock) across a
/// possibly block-wise-split request.
pub trait DataModel {
    /// Called once before the first `get_read_entry`/`write_entry`/... call
    /// of a single CoAP exchange.
    fn operation_begin(&mut self) -> Result<(), DmError>;

    /// Called once after the exchange's DM operations are done, successfully
    /// or not; implementations release whatever `operation_begin` took.
    fn operation_end(&mut self);

    /// Number of leaf resources currently readable under `path` (used to
    /// size LwM2M Read/Observe responses ahead of enumeration).
    fn get_readable_res_count(&mut self, path: &str) -> Result<usize, DmError>;

    /// Enumerates the `index`-th readable record under `path` in a stable
    /// order; returns [`ReadEntry::end`] once `index` is past the last one.
    fn get_read_entry(&mut self, path: &str, index: usize) -> Result<ReadEntry, DmError>;

    /// True if `path` resolves to at least one currently-readable resource
    /// (used by Discover and by observation attribute-path validation).
    fn path_has_readable_resources(&mut self, path: &str) -> Result<bool, DmError>;

    /// The declared type of the resource at `path`.
    fn get_resource_type(&mut self, path: &str) -> Result<ResourceKind, DmError>;

    /// Reads a single resource's current value.
    fn get_resource_value(&mut self, path: &str) -> Result<ResourceValue, DmError>;

    /// Writes `value` to `path`. `replace` distinguishes LwM2M Write-Replace
    /// from Write-Partial-Update (object/instance-level writes merge rather
    /// than wipe unspecified resources when `replace` is false).
    fn write_entry(&mut self, path: &str, value: ResourceValue, replace: bool) -> Result<(), DmError>;

    /// Creates a new instance of the object named by `path`, at
    /// `requested_instance_id` if given, or at the first free id otherwise.
    /// Returns the id actually used.
    fn create_object_instance(&mut self, path: &str, requested_instance_id: Option<u16>) -> Result<u16, DmError>;

    /// Deletes the object instance at `path`.
    fn delete_object_instance(&mut self, path: &str) -> Result<(), DmError>;

    /// Invokes the executable resource at `path` with an opaque argument payload.
    fn execute(&mut self, path: &str, args: &[u8]) -> Result<(), DmError>;

    /// Validates that the bootstrapped data model has at least one
    /// Security/Server instance pair (§4.3 "BootstrapFinish").
    fn bootstrap_validate(&mut self) -> Result<(), DmError>;

    /// Finds the Server Object (`/1`) instance whose Short Server ID
    /// resource equals `ssid`.
    fn find_server_instance(&mut self, ssid: Ssid) -> Result<Option<u16>, DmError>;

    /// Finds the Security Object (`/0`) instance whose Short Server ID
    /// resource equals `ssid`.
    fn find_security_instance(&mut self, ssid: Ssid) -> Result<Option<u16>, DmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_entry_end_is_recognised() {
        assert!(ReadEntry::end().is_end());
        assert!(!ReadEntry { id: 0, value: Some(ResourceValue::Bool(true)) }.is_end());
    }

    #[test]
    fn resource_value_numeric_projection() {
        assert_eq!(ResourceValue::Int(-3).as_f64(), Some(-3.0));
        assert_eq!(ResourceValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(ResourceValue::String(String::from("x")).as_f64(), None);
    }
}
