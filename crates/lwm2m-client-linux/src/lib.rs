//! Host bindings for running `lwm2m-client` on Linux/Unix: a non-blocking
//! UDP `Transport`, a monotonic `Clock`, an OS-seeded `Rng`, a binary RFC
//! 7252 CoAP `Codec`, and a minimal in-memory `DataModel` for demos and
//! integration tests.

use std::collections::BTreeMap;
use std::net::UdpSocket;
use std::time::Instant;

use lwm2m_client::{
    CoreError, DataModel, DmError, ReadEntry, ResourceKind, ResourceValue, Ssid,
};
use lwm2m_client::{Clock, Rng, Transport, XorShiftRng};
use lwm2m_client::{ContentFormat, Message, Operation};
use lwm2m_client::message::{BlockOption, Codec, Confirmable};
use lwm2m_client::types::{CoapCode, CreateAttributes, DiscoverAttributes, NotificationAttributes};

/// `std::net::UdpSocket`-backed [`Transport`]. The socket is always
/// non-blocking: `recv` maps `WouldBlock` to `Ok(None)` rather than
/// propagating it, matching the HAL contract.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds an ephemeral local UDP port and connects it to `server_addr`.
    pub fn connect_new(server_addr: &str) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        socket.connect(server_addr)?;
        Ok(UdpTransport { socket })
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self, server_addr: &str) -> Result<(), CoreError> {
        self.socket.connect(server_addr).map_err(|_| CoreError::TransportError)
    }

    fn close(&mut self) -> Result<(), CoreError> {
        // UDP sockets have no connection to tear down; nothing to do beyond
        // what `reuse_last_port` needs to keep the port bound for resume.
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), CoreError> {
        match self.socket.send(data) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(CoreError::WouldBlock),
            Err(_) => Err(CoreError::TransportError),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<usize>, CoreError> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(_) => Err(CoreError::TransportError),
        }
    }

    fn reuse_last_port(&mut self) -> Result<(), CoreError> {
        // The socket keeps its bound local port across a queue-mode close
        // since we never drop it; nothing further to do.
        Ok(())
    }
}

/// `std::time::Instant`-backed monotonic millisecond [`Clock`].
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// [`XorShiftRng`] seeded from the OS random source rather than a fixed
/// constant, so distinct client processes don't collide on tokens/message
/// ids if they happen to start at the same tick.
pub struct OsSeededRng(XorShiftRng);

impl OsSeededRng {
    pub fn new() -> Self {
        OsSeededRng(XorShiftRng::new(rand::random::<u32>()))
    }
}

impl Default for OsSeededRng {
    fn default() -> Self {
        Self::new()
    }
}

impl Rng for OsSeededRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
}

// --- CoAP binary wire codec (RFC 7252 §3) ---

const OPT_OBSERVE: u32 = 6;
const OPT_LOCATION_PATH: u32 = 8;
const OPT_URI_PATH: u32 = 11;
const OPT_CONTENT_FORMAT: u32 = 12;
const OPT_ACCEPT: u32 = 17;
const OPT_BLOCK2: u32 = 23;
const OPT_BLOCK1: u32 = 27;

/// Binary RFC 7252 CoAP framing, with CoRE LwM2M's conventional method
/// mapping (GET/FETCH for reads, PUT/POST/iPATCH split across the three
/// Write flavours, POST disambiguated by path depth between Create,
/// Write-Partial-Update and Execute).
pub struct CoapCodec;

impl Codec for CoapCodec {
    fn encode(&self, message: &Message<'_>, buffer: &mut [u8]) -> Result<usize, CoreError> {
        if buffer.len() < 4 {
            return Err(CoreError::BufferTooShort);
        }
        let type_bits: u8 = match message.confirmable {
            Confirmable::Con => 0,
            Confirmable::NonCon => 1,
        };
        let token = message.token.as_slice();
        let tkl = token.len();
        buffer[0] = (1 << 6) | (type_bits << 4) | tkl as u8;
        let code = resolved_code(message);
        buffer[1] = code.0;
        buffer[2..4].copy_from_slice(&message.message_id.to_be_bytes());

        let mut pos = 4;
        if buffer.len() < pos + tkl {
            return Err(CoreError::BufferTooShort);
        }
        buffer[pos..pos + tkl].copy_from_slice(token);
        pos += tkl;

        let mut last = 0u32;
        if let Some(n) = message.observe {
            let bytes = n.to_be_bytes();
            pos += write_option(&mut buffer[pos..], &mut last, OPT_OBSERVE, trim_leading_zeros(&bytes))?;
        }
        for seg in message.location_path.iter() {
            pos += write_option(&mut buffer[pos..], &mut last, OPT_LOCATION_PATH, seg)?;
        }
        for seg in message.uri_path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()) {
            pos += write_option(&mut buffer[pos..], &mut last, OPT_URI_PATH, seg.as_bytes())?;
        }
        if let Some(cf) = message.content_format {
            let bytes = (cf as u16).to_be_bytes();
            pos += write_option(&mut buffer[pos..], &mut last, OPT_CONTENT_FORMAT, trim_leading_zeros(&bytes))?;
        }
        if let Some(af) = message.accept_format {
            let bytes = (af as u16).to_be_bytes();
            pos += write_option(&mut buffer[pos..], &mut last, OPT_ACCEPT, trim_leading_zeros(&bytes))?;
        }
        if let Some(b2) = message.block2 {
            let mut tmp = [0u8; 3];
            let n = encode_block(b2, &mut tmp)?;
            pos += write_option(&mut buffer[pos..], &mut last, OPT_BLOCK2, &tmp[..n])?;
        }
        if let Some(b1) = message.block1 {
            let mut tmp = [0u8; 3];
            let n = encode_block(b1, &mut tmp)?;
            pos += write_option(&mut buffer[pos..], &mut last, OPT_BLOCK1, &tmp[..n])?;
        }

        if !message.payload.is_empty() {
            if buffer.len() < pos + 1 + message.payload.len() {
                return Err(CoreError::BufferTooShort);
            }
            buffer[pos] = 0xFF;
            pos += 1;
            buffer[pos..pos + message.payload.len()].copy_from_slice(message.payload);
            pos += message.payload.len();
        }
        Ok(pos)
    }

    fn decode<'a>(&self, buffer: &'a mut [u8]) -> Result<Message<'a>, CoreError> {
        if buffer.len() < 4 {
            return Err(CoreError::BufferTooShort);
        }
        let b0 = buffer[0];
        let type_bits = (b0 >> 4) & 0x3;
        let tkl = (b0 & 0x0F) as usize;
        let code_byte = buffer[1];
        let message_id = u16::from_be_bytes([buffer[2], buffer[3]]);

        let mut pos = 4;
        if buffer.len() < pos + tkl {
            return Err(CoreError::BufferTooShort);
        }
        let token = lwm2m_client::common::Token::new(&buffer[pos..pos + tkl])?;
        pos += tkl;

        let mut option_number = 0u32;
        let mut uri_path_first_header: Option<usize> = None;
        let mut uri_path_segments: Vec<(usize, usize)> = Vec::new();
        let mut content_format = None;
        let mut accept_format = None;
        let mut block1 = None;
        let mut block2 = None;
        let mut observe = None;
        let mut location_path = lwm2m_client::common::LocationPath::empty();

        while pos < buffer.len() && buffer[pos] != 0xFF {
            let header_start = pos;
            let hdr = buffer[pos];
            pos += 1;
            let delta = read_ext_value((hdr >> 4) as u32, buffer, &mut pos)?;
            let length = read_ext_value((hdr & 0x0F) as u32, buffer, &mut pos)? as usize;
            option_number += delta;
            if buffer.len() < pos + length {
                return Err(CoreError::BufferTooShort);
            }
            let value_start = pos;
            match option_number {
                OPT_OBSERVE => observe = Some(be_uint(&buffer[value_start..value_start + length])),
                OPT_LOCATION_PATH => location_path.push(&buffer[value_start..value_start + length])?,
                OPT_URI_PATH => {
                    if uri_path_first_header.is_none() {
                        uri_path_first_header = Some(header_start);
                    }
                    uri_path_segments.push((value_start, length));
                }
                OPT_CONTENT_FORMAT => {
                    let v = be_uint(&buffer[value_start..value_start + length]) as u16;
                    content_format = Some(ContentFormat::try_from(v)?);
                }
                OPT_ACCEPT => {
                    let v = be_uint(&buffer[value_start..value_start + length]) as u16;
                    accept_format = Some(ContentFormat::try_from(v)?);
                }
                OPT_BLOCK2 => block2 = Some(decode_block(&buffer[value_start..value_start + length])?),
                OPT_BLOCK1 => block1 = Some(decode_block(&buffer[value_start..value_start + length])?),
                _ => {}
            }
            pos += length;
        }

        // Reassemble the Uri-Path segments into one slash-joined string, in
        // place, starting at the first segment's option header byte (see
        // `Codec::decode`'s doc comment: the joined form never needs more
        // room than the option framing it replaces).
        let uri_start = uri_path_first_header.unwrap_or(0);
        let uri_len = if uri_path_segments.is_empty() {
            buffer[uri_start] = b'/';
            1
        } else {
            let mut cursor = uri_start;
            for &(seg_start, seg_len) in &uri_path_segments {
                buffer[cursor] = b'/';
                cursor += 1;
                buffer.copy_within(seg_start..seg_start + seg_len, cursor);
                cursor += seg_len;
            }
            cursor - uri_start
        };

        let payload_start = if pos < buffer.len() && buffer[pos] == 0xFF { pos + 1 } else { buffer.len() };

        let buffer: &'a [u8] = &*buffer;
        let uri_path = core::str::from_utf8(&buffer[uri_start..uri_start + uri_len])
            .map_err(|_| CoreError::Internal("uri path is not valid utf-8"))?;
        let payload = &buffer[payload_start..];

        let code = CoapCode(code_byte);
        let operation = if code_byte == 0 {
            if type_bits == 3 { Operation::CoapReset } else { Operation::CoapEmpty }
        } else if code.class() >= 2 {
            Operation::Response
        } else {
            infer_request_operation(code, uri_path, observe, accept_format)
        };

        let confirmable = if type_bits == 0 { Confirmable::Con } else { Confirmable::NonCon };

        Ok(Message {
            operation,
            message_id,
            token,
            confirmable,
            uri_path,
            content_format,
            accept_format,
            block1,
            block2,
            observe,
            location_path,
            code,
            payload,
        })
    }
}

fn resolved_code(message: &Message<'_>) -> CoapCode {
    if message.code == CoapCode::EMPTY {
        method_code_for(&message.operation)
    } else {
        message.code
    }
}

fn method_code_for(op: &Operation) -> CoapCode {
    match op {
        Operation::Register(_) | Operation::Update(_) => CoapCode::POST,
        Operation::Deregister => CoapCode::DELETE,
        Operation::BootstrapRequest { .. } | Operation::BootstrapFinish => CoapCode::POST,
        Operation::DmRead | Operation::DmDiscover(_) => CoapCode::GET,
        Operation::DmReadComposite => CoapCode::FETCH,
        Operation::DmWriteReplace => CoapCode::PUT,
        Operation::DmWritePartial => CoapCode::POST,
        Operation::DmWriteComposite => CoapCode::IPATCH,
        Operation::DmExecute => CoapCode::POST,
        Operation::DmCreate(_) => CoapCode::POST,
        Operation::DmDelete => CoapCode::DELETE,
        Operation::InfObserve(_) | Operation::InfObserveComposite(_) => CoapCode::GET,
        Operation::InfCancelObserve | Operation::InfCancelObserveComposite => CoapCode::GET,
        Operation::InfConSend | Operation::InfNonConSend => CoapCode::POST,
        Operation::InfConNotify(_) | Operation::InfNonConNotify(_) | Operation::InfInitialNotify(_) => CoapCode::EMPTY,
        Operation::Response | Operation::CoapEmpty | Operation::CoapReset | Operation::CoapPingUdp => CoapCode::EMPTY,
    }
}

/// Distinguishes the DM operation an incoming request names from its method
/// code, path depth (Create/Write-Partial-Update/Execute all ride POST) and
/// the Observe option.
fn infer_request_operation(code: CoapCode, uri_path: &str, observe: Option<u32>, accept_format: Option<ContentFormat>) -> Operation {
    if let Some(n) = observe {
        return if n == 0 {
            Operation::InfObserve(NotificationAttributes { observe_number: n })
        } else {
            Operation::InfCancelObserve
        };
    }
    match code {
        CoapCode::GET => {
            if accept_format == Some(ContentFormat::LinkFormat) {
                Operation::DmDiscover(DiscoverAttributes::default())
            } else {
                Operation::DmRead
            }
        }
        CoapCode::FETCH => Operation::DmReadComposite,
        CoapCode::PUT => Operation::DmWriteReplace,
        CoapCode::IPATCH => Operation::DmWriteComposite,
        CoapCode::DELETE => Operation::DmDelete,
        CoapCode::POST => match path_depth(uri_path) {
            1 => Operation::DmCreate(CreateAttributes::default()),
            3 => Operation::DmExecute,
            _ => Operation::DmWritePartial,
        },
        _ => Operation::CoapEmpty,
    }
}

fn path_depth(uri_path: &str) -> usize {
    uri_path.trim_matches('/').split('/').filter(|s| !s.is_empty()).count()
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}

fn be_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn decode_block(bytes: &[u8]) -> Result<BlockOption, CoreError> {
    if bytes.is_empty() || bytes.len() > 3 {
        return Err(CoreError::BufferTooShort);
    }
    let v = be_uint(bytes);
    let szx = (v & 0x7) as u8;
    let more = (v & 0x8) != 0;
    let number = v >> 4;
    let size = match szx {
        0 => 16,
        1 => 32,
        2 => 64,
        3 => 128,
        4 => 256,
        5 => 512,
        6 => 1024,
        _ => return Err(CoreError::InvalidArgument("block option szx 7 is reserved")),
    };
    Ok(BlockOption { number, size, more })
}

fn encode_block(b: BlockOption, out: &mut [u8; 3]) -> Result<usize, CoreError> {
    let szx = b.szx()?;
    let v: u32 = (b.number << 4) | ((b.more as u32) << 3) | szx as u32;
    let bytes = v.to_be_bytes();
    let n = trim_leading_zeros(&bytes).len().max(1);
    out[..n].copy_from_slice(&bytes[4 - n..]);
    Ok(n)
}

fn read_ext_value(nibble: u32, buffer: &[u8], pos: &mut usize) -> Result<u32, CoreError> {
    match nibble {
        13 => {
            if *pos >= buffer.len() {
                return Err(CoreError::BufferTooShort);
            }
            let v = buffer[*pos] as u32 + 13;
            *pos += 1;
            Ok(v)
        }
        14 => {
            if *pos + 1 >= buffer.len() {
                return Err(CoreError::BufferTooShort);
            }
            let v = u16::from_be_bytes([buffer[*pos], buffer[*pos + 1]]) as u32 + 269;
            *pos += 2;
            Ok(v)
        }
        15 => Err(CoreError::Internal("option nibble 15 is reserved for the payload marker")),
        n => Ok(n),
    }
}

fn write_option(buf: &mut [u8], last: &mut u32, number: u32, value: &[u8]) -> Result<usize, CoreError> {
    let delta = number - *last;
    let mut pos = write_opt_header(buf, delta, value.len() as u32)?;
    if buf.len() < pos + value.len() {
        return Err(CoreError::BufferTooShort);
    }
    buf[pos..pos + value.len()].copy_from_slice(value);
    pos += value.len();
    *last = number;
    Ok(pos)
}

fn write_opt_header(buf: &mut [u8], delta: u32, length: u32) -> Result<usize, CoreError> {
    if buf.is_empty() {
        return Err(CoreError::BufferTooShort);
    }
    let (delta_nib, delta_ext) = ext_nibble(delta);
    let (len_nib, len_ext) = ext_nibble(length);
    buf[0] = ((delta_nib as u8) << 4) | (len_nib as u8);
    let mut pos = 1;
    pos += write_ext_bytes(&mut buf[pos..], delta_ext)?;
    pos += write_ext_bytes(&mut buf[pos..], len_ext)?;
    Ok(pos)
}

enum ExtBytes {
    One(u8),
    Two(u16),
}

fn ext_nibble(v: u32) -> (u32, Option<ExtBytes>) {
    if v < 13 {
        (v, None)
    } else if v < 269 {
        (13, Some(ExtBytes::One((v - 13) as u8)))
    } else {
        (14, Some(ExtBytes::Two((v - 269) as u16)))
    }
}

fn write_ext_bytes(buf: &mut [u8], ext: Option<ExtBytes>) -> Result<usize, CoreError> {
    match ext {
        None => Ok(0),
        Some(ExtBytes::One(b)) => {
            if buf.is_empty() {
                return Err(CoreError::BufferTooShort);
            }
            buf[0] = b;
            Ok(1)
        }
        Some(ExtBytes::Two(v)) => {
            if buf.len() < 2 {
                return Err(CoreError::BufferTooShort);
            }
            buf[..2].copy_from_slice(&v.to_be_bytes());
            Ok(2)
        }
    }
}

// --- Minimal in-memory data model, for demos and integration tests ---

/// One resource's value plus whether it currently accepts reads/writes
/// (LwM2M resources can be write-only, e.g. a PSK, or execute-only).
#[derive(Debug, Clone)]
struct Resource {
    kind: ResourceKind,
    value: ResourceValue,
    readable: bool,
}

/// A flat `object_id/instance_id/resource_id -> Resource` store, the
/// simplest possible [`DataModel`] that actually round-trips Read/Write/
/// Create/Delete/Execute against real storage. Not meant to be a production
/// object store — just enough to drive the client end to end in tests and
/// demos, the way the teacher's own loopback test fixtures stand in for a
/// full network stack.
pub struct ObjectStore {
    resources: BTreeMap<(u16, u16, u16), Resource>,
    instances: BTreeMap<u16, Vec<u16>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        ObjectStore { resources: BTreeMap::new(), instances: BTreeMap::new() }
    }

    /// Declares a resource and seeds its initial value. Intended for
    /// one-time setup before the client starts stepping.
    pub fn declare(&mut self, object_id: u16, instance_id: u16, resource_id: u16, kind: ResourceKind, value: ResourceValue, readable: bool) {
        self.instances.entry(object_id).or_default();
        let instance_list = self.instances.get_mut(&object_id).unwrap();
        if !instance_list.contains(&instance_id) {
            instance_list.push(instance_id);
            instance_list.sort_unstable();
        }
        self.resources.insert((object_id, instance_id, resource_id), Resource { kind, value, readable });
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a `/o/i/r` LwM2M path into its present components.
fn split_path(path: &str) -> Result<(Option<u16>, Option<u16>, Option<u16>), DmError> {
    let mut parts = path.trim_matches('/').split('/').filter(|s| !s.is_empty());
    let parse = |s: &str| s.parse::<u16>().map_err(|_| DmError::BadRequest);
    let object_id = match parts.next() {
        Some(s) => Some(parse(s)?),
        None => None,
    };
    let instance_id = match parts.next() {
        Some(s) => Some(parse(s)?),
        None => None,
    };
    let resource_id = match parts.next() {
        Some(s) => Some(parse(s)?),
        None => None,
    };
    Ok((object_id, instance_id, resource_id))
}

impl DataModel for ObjectStore {
    fn operation_begin(&mut self) -> Result<(), DmError> {
        Ok(())
    }

    fn operation_end(&mut self) {}

    fn get_readable_res_count(&mut self, path: &str) -> Result<usize, DmError> {
        let (object_id, instance_id, resource_id) = split_path(path)?;
        Ok(self.matching(object_id, instance_id, resource_id).filter(|(_, r)| r.readable).count())
    }

    fn get_read_entry(&mut self, path: &str, index: usize) -> Result<ReadEntry, DmError> {
        let (object_id, instance_id, resource_id) = split_path(path)?;
        match self.matching(object_id, instance_id, resource_id).filter(|(_, r)| r.readable).nth(index) {
            Some(((_, _, rid), r)) => Ok(ReadEntry { id: *rid as i32, value: Some(r.value.clone()) }),
            None => Ok(ReadEntry::end()),
        }
    }

    fn path_has_readable_resources(&mut self, path: &str) -> Result<bool, DmError> {
        Ok(self.get_readable_res_count(path)? > 0)
    }

    fn get_resource_type(&mut self, path: &str) -> Result<ResourceKind, DmError> {
        let (object_id, instance_id, resource_id) = split_path(path)?;
        let key = full_key(object_id, instance_id, resource_id)?;
        self.resources.get(&key).map(|r| r.kind).ok_or(DmError::NotFound)
    }

    fn get_resource_value(&mut self, path: &str) -> Result<ResourceValue, DmError> {
        let (object_id, instance_id, resource_id) = split_path(path)?;
        let key = full_key(object_id, instance_id, resource_id)?;
        self.resources.get(&key).map(|r| r.value.clone()).ok_or(DmError::NotFound)
    }

    fn write_entry(&mut self, path: &str, value: ResourceValue, _replace: bool) -> Result<(), DmError> {
        let (object_id, instance_id, resource_id) = split_path(path)?;
        let key = full_key(object_id, instance_id, resource_id)?;
        let res = self.resources.get_mut(&key).ok_or(DmError::NotFound)?;
        res.value = value;
        Ok(())
    }

    fn create_object_instance(&mut self, path: &str, requested_instance_id: Option<u16>) -> Result<u16, DmError> {
        let (object_id, _, _) = split_path(path)?;
        let object_id = object_id.ok_or(DmError::BadRequest)?;
        let list = self.instances.entry(object_id).or_default();
        let instance_id = match requested_instance_id {
            Some(id) if !list.contains(&id) => id,
            Some(_) => return Err(DmError::BadRequest),
            None => (0..u16::MAX).find(|id| !list.contains(id)).ok_or(DmError::ServiceUnavailable)?,
        };
        list.push(instance_id);
        list.sort_unstable();
        Ok(instance_id)
    }

    fn delete_object_instance(&mut self, path: &str) -> Result<(), DmError> {
        let (object_id, instance_id, _) = split_path(path)?;
        let object_id = object_id.ok_or(DmError::BadRequest)?;
        let instance_id = instance_id.ok_or(DmError::BadRequest)?;
        let list = self.instances.get_mut(&object_id).ok_or(DmError::NotFound)?;
        let before = list.len();
        list.retain(|&id| id != instance_id);
        if list.len() == before {
            return Err(DmError::NotFound);
        }
        self.resources.retain(|&(o, i, _), _| !(o == object_id && i == instance_id));
        Ok(())
    }

    fn execute(&mut self, path: &str, _args: &[u8]) -> Result<(), DmError> {
        let (object_id, instance_id, resource_id) = split_path(path)?;
        let key = full_key(object_id, instance_id, resource_id)?;
        if self.resources.contains_key(&key) {
            Ok(())
        } else {
            Err(DmError::NotFound)
        }
    }

    fn bootstrap_validate(&mut self) -> Result<(), DmError> {
        let has_security = self.instances.get(&0).map(|l| !l.is_empty()).unwrap_or(false);
        let has_server = self.instances.get(&1).map(|l| !l.is_empty()).unwrap_or(false);
        if has_security && has_server {
            Ok(())
        } else {
            Err(DmError::BadRequest)
        }
    }

    fn find_server_instance(&mut self, ssid: Ssid) -> Result<Option<u16>, DmError> {
        self.find_ssid_match(1, ssid)
    }

    fn find_security_instance(&mut self, ssid: Ssid) -> Result<Option<u16>, DmError> {
        self.find_ssid_match(0, ssid)
    }
}

fn full_key(object_id: Option<u16>, instance_id: Option<u16>, resource_id: Option<u16>) -> Result<(u16, u16, u16), DmError> {
    match (object_id, instance_id, resource_id) {
        (Some(o), Some(i), Some(r)) => Ok((o, i, r)),
        _ => Err(DmError::BadRequest),
    }
}

impl ObjectStore {
    fn matching(&self, object_id: Option<u16>, instance_id: Option<u16>, resource_id: Option<u16>) -> impl Iterator<Item = (&(u16, u16, u16), &Resource)> {
        self.resources.iter().filter(move |((o, i, r), _)| {
            object_id.map(|want| want == *o).unwrap_or(true)
                && instance_id.map(|want| want == *i).unwrap_or(true)
                && resource_id.map(|want| want == *r).unwrap_or(true)
        })
    }

    /// Short Server ID resource convention: resource 0 on Security (`/0`),
    /// resource 0 on Server (`/1`), per the LwM2M core object definitions.
    fn find_ssid_match(&mut self, object_id: u16, ssid: Ssid) -> Result<Option<u16>, DmError> {
        let instances = self.instances.get(&object_id).cloned().unwrap_or_default();
        for instance_id in instances {
            if let Some(r) = self.resources.get(&(object_id, instance_id, 0)) {
                match &r.value {
                    ResourceValue::UInt(v) if *v as Ssid == ssid => return Ok(Some(instance_id)),
                    ResourceValue::Int(v) if *v as Ssid == ssid => return Ok(Some(instance_id)),
                    _ => {}
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message<'a>(uri_path: &'a str) -> Message<'a> {
        let mut msg = Message::request(Operation::DmRead, uri_path, Confirmable::Con);
        msg.message_id = 0x1234;
        msg
    }

    #[test]
    fn round_trips_a_read_request() {
        let codec = CoapCodec;
        let msg = sample_message("/3/0/1");
        let mut buf = [0u8; 256];
        let n = codec.encode(&msg, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf[..n]).unwrap();
        assert_eq!(decoded.uri_path, "/3/0/1");
        assert_eq!(decoded.message_id, 0x1234);
        assert!(matches!(decoded.operation, Operation::DmRead));
    }

    #[test]
    fn round_trips_a_write_with_payload_and_content_format() {
        let codec = CoapCodec;
        let mut msg = Message::request(Operation::DmWriteReplace, "/3/0/1", Confirmable::Con);
        msg.payload = b"42";
        msg.content_format = Some(ContentFormat::PlainText);
        let mut buf = [0u8; 256];
        let n = codec.encode(&msg, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf[..n]).unwrap();
        assert_eq!(decoded.payload, b"42");
        assert_eq!(decoded.content_format, Some(ContentFormat::PlainText));
        assert!(matches!(decoded.operation, Operation::DmWriteReplace));
    }

    #[test]
    fn post_disambiguates_create_execute_and_write_partial_by_path_depth() {
        assert!(matches!(infer_request_operation(CoapCode::POST, "/3", None, None), Operation::DmCreate(_)));
        assert!(matches!(infer_request_operation(CoapCode::POST, "/3/0/4", None, None), Operation::DmExecute));
        assert!(matches!(infer_request_operation(CoapCode::POST, "/3/0", None, None), Operation::DmWritePartial));
    }

    #[test]
    fn get_with_link_format_accept_is_discover() {
        let op = infer_request_operation(CoapCode::GET, "/3", None, Some(ContentFormat::LinkFormat));
        assert!(matches!(op, Operation::DmDiscover(_)));
    }

    #[test]
    fn block_option_round_trips_through_wire_encoding() {
        let b = BlockOption { number: 3, size: 64, more: true };
        let mut tmp = [0u8; 3];
        let n = encode_block(b, &mut tmp).unwrap();
        let decoded = decode_block(&tmp[..n]).unwrap();
        assert_eq!(decoded, b);
    }

    #[test]
    fn object_store_round_trips_write_then_read() {
        let mut store = ObjectStore::new();
        store.declare(3, 0, 1, ResourceKind::Integer, ResourceValue::Int(0), true);
        store.write_entry("/3/0/1", ResourceValue::Int(7), true).unwrap();
        assert_eq!(store.get_resource_value("/3/0/1").unwrap(), ResourceValue::Int(7));
    }

    #[test]
    fn object_store_create_and_delete_instance() {
        let mut store = ObjectStore::new();
        let id = store.create_object_instance("/3", None).unwrap();
        assert_eq!(id, 0);
        store.declare(3, id, 1, ResourceKind::Integer, ResourceValue::Int(1), true);
        store.delete_object_instance("/3/0").unwrap();
        assert_eq!(store.get_resource_value("/3/0/1"), Err(DmError::NotFound));
    }

    #[test]
    fn bootstrap_validate_requires_security_and_server_instances() {
        let mut store = ObjectStore::new();
        assert_eq!(store.bootstrap_validate(), Err(DmError::BadRequest));
        store.declare(0, 0, 0, ResourceKind::UnsignedInteger, ResourceValue::UInt(1), true);
        store.declare(1, 0, 0, ResourceKind::UnsignedInteger, ResourceValue::UInt(1), true);
        assert!(store.bootstrap_validate().is_ok());
    }
}
