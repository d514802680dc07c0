//! Shared fixtures for the crate's integration tests: an in-memory,
//! two-ended UDP-like `Transport` pair, a steerable `Clock`, and a small
//! `DataModel` backed by a flat resource map. None of this is a real CoAP
//! wire format — `lwm2m-client-linux`'s `CoapCodec` covers that — it only
//! needs to round-trip whatever the exchange engine itself puts into a
//! `Message`, so the core crate's lifecycle/exchange logic can be exercised
//! without a host binding.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use lwm2m_client::message::{BlockOption, Codec, Confirmable, Message};
use lwm2m_client::types::CoapCode;
use lwm2m_client::{Clock, ContentFormat, CoreError, DataModel, DmError, ReadEntry, ResourceKind, ResourceValue, Ssid, Transport};

/// One end of an in-memory datagram pipe. `connect_pair` wires two of these
/// together so each side's sends land in the other's recv queue, the way two
/// real UDP sockets would over loopback.
pub struct InMemoryTransport {
    inbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    outbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
}

impl InMemoryTransport {
    pub fn connect_pair() -> (Self, Self) {
        let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a = Rc::new(RefCell::new(VecDeque::new()));
        let client = InMemoryTransport { inbox: b_to_a.clone(), outbox: a_to_b.clone() };
        let server = InMemoryTransport { inbox: a_to_b, outbox: b_to_a };
        (client, server)
    }
}

impl Transport for InMemoryTransport {
    fn connect(&mut self, _server_addr: &str) -> Result<(), CoreError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), CoreError> {
        self.outbox.borrow_mut().push_back(data.to_vec());
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, CoreError> {
        match self.inbox.borrow_mut().pop_front() {
            Some(datagram) => {
                if datagram.len() > buf.len() {
                    return Err(CoreError::BufferTooShort);
                }
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(Some(datagram.len()))
            }
            None => Ok(None),
        }
    }
}

/// A `Clock` the test advances explicitly rather than one backed by
/// wall-clock time, so pmin/pmax/retransmission timing assertions are exact.
#[derive(Clone)]
pub struct SteerableClock(Rc<Cell<u64>>);

impl SteerableClock {
    pub fn new() -> Self {
        SteerableClock(Rc::new(Cell::new(0)))
    }

    pub fn advance(&self, delta_ms: u64) {
        self.0.set(self.0.get() + delta_ms);
    }
}

impl Clock for SteerableClock {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

/// Fixed-length-prefixed serialisation of every `Message` field the exchange
/// engine and lifecycle code populate. Not a real CoAP encoder: both ends of
/// these tests use the same `TestCodec`, so only internal consistency
/// matters, not wire compatibility with a real LwM2M server.
pub struct TestCodec;

fn put_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u16).to_be_bytes());
    buf.extend_from_slice(data);
}

fn take_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], CoreError> {
    if *pos + 2 > buf.len() {
        return Err(CoreError::BufferTooShort);
    }
    let len = u16::from_be_bytes([buf[*pos], buf[*pos + 1]]) as usize;
    *pos += 2;
    if *pos + len > buf.len() {
        return Err(CoreError::BufferTooShort);
    }
    let out = &buf[*pos..*pos + len];
    *pos += len;
    Ok(out)
}

/// Compact tag identifying an `Operation` variant on the wire. Only the
/// variants these integration tests actually send need a tag; anything else
/// falls back to `DmRead` on decode, same as the request-class heuristic
/// this replaced.
fn operation_tag(op: &lwm2m_client::Operation) -> u8 {
    match op {
        lwm2m_client::Operation::Register(_) => 1,
        lwm2m_client::Operation::Update(_) => 2,
        lwm2m_client::Operation::Deregister => 3,
        lwm2m_client::Operation::Response => 4,
        lwm2m_client::Operation::CoapEmpty => 5,
        lwm2m_client::Operation::CoapReset => 6,
        _ => 0,
    }
}

impl Codec for TestCodec {
    fn encode(&self, message: &Message<'_>, buffer: &mut [u8]) -> Result<usize, CoreError> {
        let mut out = Vec::new();
        out.push(message.code.0);
        out.push(operation_tag(&message.operation));
        out.extend_from_slice(&message.message_id.to_be_bytes());
        out.push(match message.confirmable {
            Confirmable::Con => 0,
            Confirmable::NonCon => 1,
        });
        put_bytes(&mut out, message.token.as_slice());
        put_bytes(&mut out, message.uri_path.as_bytes());
        out.push(message.content_format.map(|_| 1).unwrap_or(0));
        if let Some(cf) = message.content_format {
            out.extend_from_slice(&(cf as u16).to_be_bytes());
        }
        out.push(message.observe.map(|_| 1).unwrap_or(0));
        if let Some(n) = message.observe {
            out.extend_from_slice(&n.to_be_bytes());
        }
        out.push(message.block1.map(|_| 1).unwrap_or(0));
        if let Some(b) = message.block1 {
            out.extend_from_slice(&b.number.to_be_bytes());
            out.extend_from_slice(&b.size.to_be_bytes());
            out.push(b.more as u8);
        }
        out.push(message.block2.map(|_| 1).unwrap_or(0));
        if let Some(b) = message.block2 {
            out.extend_from_slice(&b.number.to_be_bytes());
            out.extend_from_slice(&b.size.to_be_bytes());
            out.push(b.more as u8);
        }
        out.push(message.location_path.len() as u8);
        for seg in message.location_path.iter() {
            put_bytes(&mut out, seg);
        }
        put_bytes(&mut out, message.payload);

        if buffer.len() < out.len() {
            return Err(CoreError::BufferTooShort);
        }
        buffer[..out.len()].copy_from_slice(&out);
        Ok(out.len())
    }

    fn decode<'a>(&self, buffer: &'a mut [u8]) -> Result<Message<'a>, CoreError> {
        let mut pos = 0;
        if buffer.is_empty() {
            return Err(CoreError::BufferTooShort);
        }
        let code = CoapCode(buffer[pos]);
        pos += 1;
        if pos >= buffer.len() {
            return Err(CoreError::BufferTooShort);
        }
        let operation_tag = buffer[pos];
        pos += 1;
        if pos + 2 > buffer.len() {
            return Err(CoreError::BufferTooShort);
        }
        let message_id = u16::from_be_bytes([buffer[pos], buffer[pos + 1]]);
        pos += 2;
        let confirmable = if buffer[pos] == 0 { Confirmable::Con } else { Confirmable::NonCon };
        pos += 1;

        let token = lwm2m_client::common::Token::new(take_bytes(buffer, &mut pos)?)?;
        let uri_path_len = {
            let slice = take_bytes(buffer, &mut pos)?;
            slice.len()
        };
        let uri_path_start = pos - uri_path_len;

        let has_cf = buffer[pos] == 1;
        pos += 1;
        let content_format = if has_cf {
            let v = u16::from_be_bytes([buffer[pos], buffer[pos + 1]]);
            pos += 2;
            Some(ContentFormat::try_from(v)?)
        } else {
            None
        };

        let has_observe = buffer[pos] == 1;
        pos += 1;
        let observe = if has_observe {
            let v = u32::from_be_bytes([buffer[pos], buffer[pos + 1], buffer[pos + 2], buffer[pos + 3]]);
            pos += 4;
            Some(v)
        } else {
            None
        };

        let has_block1 = buffer[pos] == 1;
        pos += 1;
        let block1 = if has_block1 {
            let number = u32::from_be_bytes([buffer[pos], buffer[pos + 1], buffer[pos + 2], buffer[pos + 3]]);
            let size = u16::from_be_bytes([buffer[pos + 4], buffer[pos + 5]]);
            let more = buffer[pos + 6] != 0;
            pos += 7;
            Some(BlockOption { number, size, more })
        } else {
            None
        };

        let has_block2 = buffer[pos] == 1;
        pos += 1;
        let block2 = if has_block2 {
            let number = u32::from_be_bytes([buffer[pos], buffer[pos + 1], buffer[pos + 2], buffer[pos + 3]]);
            let size = u16::from_be_bytes([buffer[pos + 4], buffer[pos + 5]]);
            let more = buffer[pos + 6] != 0;
            pos += 7;
            Some(BlockOption { number, size, more })
        } else {
            None
        };

        let mut location_path = lwm2m_client::common::LocationPath::empty();
        let location_count = buffer[pos];
        pos += 1;
        for _ in 0..location_count {
            let seg = take_bytes(buffer, &mut pos)?;
            location_path.push(seg)?;
        }

        let payload_len = {
            let slice = take_bytes(buffer, &mut pos)?;
            slice.len()
        };
        let payload_start = pos - payload_len;

        let operation = match operation_tag {
            1 => lwm2m_client::Operation::Register(lwm2m_client::types::RegisterAttributes::default()),
            2 => lwm2m_client::Operation::Update(lwm2m_client::types::RegisterAttributes::default()),
            3 => lwm2m_client::Operation::Deregister,
            4 => lwm2m_client::Operation::Response,
            5 => lwm2m_client::Operation::CoapEmpty,
            6 => lwm2m_client::Operation::CoapReset,
            _ => lwm2m_client::Operation::DmRead,
        };

        let buffer: &'a [u8] = &*buffer;
        let uri_path = core::str::from_utf8(&buffer[uri_path_start..uri_path_start + uri_path_len])
            .map_err(|_| CoreError::Internal("uri path is not valid utf-8"))?;
        let payload = &buffer[payload_start..payload_start + payload_len];

        Ok(Message {
            operation,
            message_id,
            token,
            confirmable,
            uri_path,
            content_format,
            accept_format: None,
            block1,
            block2,
            observe,
            location_path,
            code,
            payload,
        })
    }
}

/// A flat `/object/instance/resource` store, grounded on the same shape as
/// `lwm2m-client-linux::ObjectStore` but kept local to this test harness so
/// the core crate's test suite has no dependency on the host binding crate.
pub struct TestDataModel {
    resources: std::collections::BTreeMap<(u16, u16, u16), ResourceValue>,
}

impl TestDataModel {
    pub fn new() -> Self {
        TestDataModel { resources: std::collections::BTreeMap::new() }
    }

    pub fn declare(&mut self, object_id: u16, instance_id: u16, resource_id: u16, value: ResourceValue) {
        self.resources.insert((object_id, instance_id, resource_id), value);
    }
}

fn split_path(path: &str) -> Vec<u16> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).map(|s| s.parse().unwrap()).collect()
}

impl DataModel for TestDataModel {
    fn operation_begin(&mut self) -> Result<(), DmError> {
        Ok(())
    }

    fn operation_end(&mut self) {}

    fn get_readable_res_count(&mut self, path: &str) -> Result<usize, DmError> {
        let parts = split_path(path);
        if !parts.is_empty() {
            return Ok(0);
        }
        let object_ids: std::collections::BTreeSet<u16> = self.resources.keys().map(|(o, _, _)| *o).collect();
        Ok(object_ids.len())
    }

    fn get_read_entry(&mut self, path: &str, index: usize) -> Result<ReadEntry, DmError> {
        let parts = split_path(path);
        if !parts.is_empty() {
            return Ok(ReadEntry::end());
        }
        let object_ids: std::collections::BTreeSet<u16> = self.resources.keys().map(|(o, _, _)| *o).collect();
        match object_ids.iter().nth(index) {
            Some(&id) => Ok(ReadEntry { id: id as i32, value: None }),
            None => Ok(ReadEntry::end()),
        }
    }

    fn path_has_readable_resources(&mut self, path: &str) -> Result<bool, DmError> {
        Ok(self.get_readable_res_count(path)? > 0)
    }

    fn get_resource_type(&mut self, _path: &str) -> Result<ResourceKind, DmError> {
        Ok(ResourceKind::Integer)
    }

    fn get_resource_value(&mut self, path: &str) -> Result<ResourceValue, DmError> {
        let parts = split_path(path);
        if parts.len() != 3 {
            return Err(DmError::BadRequest);
        }
        self.resources.get(&(parts[0], parts[1], parts[2])).cloned().ok_or(DmError::NotFound)
    }

    fn write_entry(&mut self, path: &str, value: ResourceValue, _replace: bool) -> Result<(), DmError> {
        let parts = split_path(path);
        if parts.len() != 3 {
            return Err(DmError::BadRequest);
        }
        self.resources.insert((parts[0], parts[1], parts[2]), value);
        Ok(())
    }

    fn create_object_instance(&mut self, _path: &str, _requested_instance_id: Option<u16>) -> Result<u16, DmError> {
        Err(DmError::NotImplemented)
    }

    fn delete_object_instance(&mut self, _path: &str) -> Result<(), DmError> {
        Err(DmError::NotImplemented)
    }

    fn execute(&mut self, _path: &str, _args: &[u8]) -> Result<(), DmError> {
        Err(DmError::NotImplemented)
    }

    fn bootstrap_validate(&mut self) -> Result<(), DmError> {
        Ok(())
    }

    fn find_server_instance(&mut self, _ssid: Ssid) -> Result<Option<u16>, DmError> {
        Ok(Some(0))
    }

    fn find_security_instance(&mut self, _ssid: Ssid) -> Result<Option<u16>, DmError> {
        Ok(Some(0))
    }
}
