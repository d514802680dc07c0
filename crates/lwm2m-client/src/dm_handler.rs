// crates/lwm2m-client/src/dm_handler.rs

//! Services a server-initiated DM request (§4.6): Read, Discover, the three
//! Write variants, Execute, Create and Delete. Built generically over
//! [`DataModel`] the same way `RegisterHandler`/`SendHandler` are, using the
//! same plain `path=value;` stand-in wire rendering pending an external
//! SenML/OMA-CBOR encoder.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dm::{DataModel, ResourceKind, ResourceValue};
use crate::error::{CoreError, DmError};
use crate::exchange::ExchangeHandler;
use crate::message::Message;
use crate::types::{CoapCode, Operation};

/// Handles one server-initiated `DmRead`/`DmDiscover`/`DmWrite*`/`DmExecute`/
/// `DmCreate`/`DmDelete` exchange.
///
/// `InfObserve*`/`InfCancelObserve*` reach this handler too (a server can
/// start or cancel an observation over the same CoAP verbs) but are reported
/// as `DmError::NotImplemented`: servicing them needs a URI-query option this
/// crate's `Message` does not carry yet, so only the host-API-driven
/// `Anj::observe`/`cancel_observation` path works for now.
pub struct DmHandler {
    operation: Operation,
    path: String,
    /// The composite read's requested-paths list, captured verbatim from the
    /// incoming payload (Read itself carries no body to act on otherwise).
    request_body: Vec<u8>,
    rendered: Vec<u8>,
    error: Option<DmError>,
}

impl DmHandler {
    pub fn new(operation: Operation, path: &str) -> Self {
        DmHandler { operation, path: String::from(path), request_body: Vec::new(), rendered: Vec::new(), error: None }
    }
}

impl ExchangeHandler for DmHandler {
    fn read_payload(&mut self, dm: &mut dyn DataModel, payload: &[u8]) -> Result<(), DmError> {
        let outcome = match &self.operation {
            Operation::DmReadComposite => {
                self.request_body.clear();
                self.request_body.extend_from_slice(payload);
                Ok(())
            }
            Operation::DmRead | Operation::DmDiscover(_) => Ok(()),
            Operation::DmWriteReplace => write_single(dm, &self.path, payload, true),
            Operation::DmWritePartial => write_single(dm, &self.path, payload, false),
            Operation::DmWriteComposite => write_composite(dm, payload),
            Operation::DmExecute => dm.execute(&self.path, payload),
            Operation::DmCreate(attrs) => create_instance(dm, &self.path, attrs.instance_id, payload),
            Operation::DmDelete => dm.delete_object_instance(&self.path),
            Operation::InfObserve(_)
            | Operation::InfObserveComposite(_)
            | Operation::InfCancelObserve
            | Operation::InfCancelObserveComposite => Err(DmError::NotImplemented),
            _ => Err(DmError::MethodNotAllowed),
        };
        // Errors are recorded rather than propagated: the engine has no
        // response to send yet when `read_payload` runs, so a failed
        // operation still needs to reach `build_outgoing` to report its code.
        if let Err(e) = outcome {
            self.error = Some(e);
        }
        Ok(())
    }

    fn write_payload<'a>(&'a mut self, dm: &mut dyn DataModel, offset: usize, max_len: usize) -> Result<(&'a [u8], bool), DmError> {
        if offset == 0 && self.error.is_none() {
            let result = match &self.operation {
                Operation::DmRead => render_read(dm, &self.path, &mut self.rendered),
                Operation::DmReadComposite => {
                    let paths = core::str::from_utf8(&self.request_body).map_err(|_| DmError::BadRequest)?;
                    render_composite_read(dm, paths, &mut self.rendered)
                }
                Operation::DmDiscover(_) => render_discover(dm, &self.path, &mut self.rendered),
                _ => {
                    self.rendered.clear();
                    Ok(())
                }
            };
            if let Err(e) = result {
                self.error = Some(e);
                self.rendered.clear();
            }
        }
        Ok(crate::exchange::block_slice(&self.rendered, offset, max_len))
    }

    fn completion(&mut self, _dm: &mut dyn DataModel, _response: Option<&Message<'_>>) -> Result<(), CoreError> {
        Ok(())
    }

    fn response_code(&self) -> CoapCode {
        if let Some(e) = self.error {
            return e.to_coap_code();
        }
        match self.operation {
            Operation::DmRead | Operation::DmReadComposite | Operation::DmDiscover(_) => CoapCode::CONTENT,
            Operation::DmCreate(_) => CoapCode::CREATED,
            Operation::DmDelete => CoapCode::DELETED,
            Operation::DmWriteReplace | Operation::DmWritePartial | Operation::DmWriteComposite | Operation::DmExecute => CoapCode::CHANGED,
            _ => CoapCode::NOT_IMPLEMENTED,
        }
    }
}

/// Decodes one scalar value of `kind` out of its plain stand-in wire form.
fn parse_value(kind: ResourceKind, bytes: &[u8]) -> Result<ResourceValue, DmError> {
    let s = core::str::from_utf8(bytes).map_err(|_| DmError::BadRequest)?;
    Ok(match kind {
        ResourceKind::String => ResourceValue::String(String::from(s)),
        ResourceKind::Integer | ResourceKind::Time => ResourceValue::Int(s.parse().map_err(|_| DmError::BadRequest)?),
        ResourceKind::UnsignedInteger => ResourceValue::UInt(s.parse().map_err(|_| DmError::BadRequest)?),
        ResourceKind::Float => ResourceValue::Float(s.parse().map_err(|_| DmError::BadRequest)?),
        ResourceKind::Boolean => ResourceValue::Bool(s == "true" || s == "1"),
        ResourceKind::Opaque => ResourceValue::Opaque(Vec::from(bytes)),
        ResourceKind::Objlnk => {
            let mut parts = s.splitn(2, ':');
            let object_id = parts.next().and_then(|p| p.parse().ok()).ok_or(DmError::BadRequest)?;
            let instance_id = parts.next().and_then(|p| p.parse().ok()).ok_or(DmError::BadRequest)?;
            ResourceValue::ObjLink { object_id, instance_id }
        }
        ResourceKind::Corelnk | ResourceKind::Multiple => return Err(DmError::UnsupportedContentFormat),
    })
}

fn write_single(dm: &mut dyn DataModel, path: &str, payload: &[u8], replace: bool) -> Result<(), DmError> {
    let kind = dm.get_resource_type(path)?;
    let value = parse_value(kind, payload)?;
    dm.write_entry(path, value, replace)
}

/// Writes each `path=value;` record in `payload`, LwM2M Write-Composite
/// semantics: every record is an independent partial update.
fn write_composite(dm: &mut dyn DataModel, payload: &[u8]) -> Result<(), DmError> {
    for record in payload.split(|&b| b == b';') {
        if record.is_empty() {
            continue;
        }
        let sep = record.iter().position(|&b| b == b'=').ok_or(DmError::BadRequest)?;
        let path = core::str::from_utf8(&record[..sep]).map_err(|_| DmError::BadRequest)?;
        let kind = dm.get_resource_type(path)?;
        let value = parse_value(kind, &record[sep + 1..])?;
        dm.write_entry(path, value, false)?;
    }
    Ok(())
}

/// Creates the instance, then applies any `path=value;` initial resources
/// the Create body carried.
fn create_instance(dm: &mut dyn DataModel, path: &str, requested_id: Option<u16>, payload: &[u8]) -> Result<(), DmError> {
    dm.create_object_instance(path, requested_id)?;
    if payload.is_empty() {
        return Ok(());
    }
    write_composite(dm, payload)
}

fn append_value(value: &ResourceValue, out: &mut Vec<u8>) {
    match value {
        ResourceValue::String(s) => out.extend_from_slice(s.as_bytes()),
        ResourceValue::Opaque(bytes) => out.extend_from_slice(bytes),
        ResourceValue::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        ResourceValue::Int(v) => out.extend_from_slice(alloc::format!("{v}").as_bytes()),
        ResourceValue::UInt(v) => out.extend_from_slice(alloc::format!("{v}").as_bytes()),
        ResourceValue::Float(v) => out.extend_from_slice(alloc::format!("{v}").as_bytes()),
        ResourceValue::ObjLink { object_id, instance_id } => {
            out.extend_from_slice(alloc::format!("{object_id}:{instance_id}").as_bytes())
        }
    }
}

fn render_read(dm: &mut dyn DataModel, path: &str, out: &mut Vec<u8>) -> Result<(), DmError> {
    out.clear();
    let count = dm.get_readable_res_count(path)?;
    for i in 0..count {
        let entry = dm.get_read_entry(path, i)?;
        if entry.is_end() {
            break;
        }
        if let Some(value) = entry.value {
            out.extend_from_slice(alloc::format!("{}", entry.id).as_bytes());
            out.push(b'=');
            append_value(&value, out);
            out.push(b';');
        }
    }
    Ok(())
}

/// `path` here is the composite read's own payload: a `;`-separated list of
/// the paths the server asked for, each rendered as `{path}/{id}=value;`.
fn render_composite_read(dm: &mut dyn DataModel, paths_payload: &str, out: &mut Vec<u8>) -> Result<(), DmError> {
    out.clear();
    for path in paths_payload.split(';').map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let count = dm.get_readable_res_count(path)?;
        for i in 0..count {
            let entry = dm.get_read_entry(path, i)?;
            if entry.is_end() {
                break;
            }
            if let Some(value) = entry.value {
                out.extend_from_slice(path.as_bytes());
                out.push(b'/');
                out.extend_from_slice(alloc::format!("{}", entry.id).as_bytes());
                out.push(b'=');
                append_value(&value, out);
                out.push(b';');
            }
        }
    }
    Ok(())
}

/// Renders `path`'s children as CoRE Link-Format (RFC 6690), the same
/// encoding `RegisterHandler` uses for the Register payload.
fn render_discover(dm: &mut dyn DataModel, path: &str, out: &mut Vec<u8>) -> Result<(), DmError> {
    out.clear();
    let count = dm.get_readable_res_count(path)?;
    for i in 0..count {
        let entry = dm.get_read_entry(path, i)?;
        if entry.is_end() {
            break;
        }
        out.extend_from_slice(b"<");
        out.extend_from_slice(path.as_bytes());
        out.push(b'/');
        out.extend_from_slice(alloc::format!("{}", entry.id).as_bytes());
        out.extend_from_slice(b">,");
    }
    if out.ends_with(b",") {
        out.pop();
    }
    Ok(())
}
