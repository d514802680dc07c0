//! End-to-end lifecycle scenarios from the testable-properties list: a
//! Register/Update round trip over the in-memory harness, and the
//! single-flight property (no second exchange starts while one is ongoing).

mod harness;

use harness::{InMemoryTransport, SteerableClock, TestCodec, TestDataModel};
use lwm2m_client::message::Codec;
use lwm2m_client::types::CoapCode;
use lwm2m_client::{Anj, Config, ConnectionStatus, Operation, XorShiftRng};

fn drive_until_registered(
    anj: &mut Anj<InMemoryTransport, SteerableClock, XorShiftRng, TestCodec>,
    dm: &mut TestDataModel,
    server: &mut InMemoryTransport,
) {
    // `step_initial` only builds the Register exchange and flips status to
    // Registering; the datagram is actually sent on the following step, once
    // `step_registering` drives the engine. Run a couple of unconditional
    // steps rather than stopping the instant status changes.
    for _ in 0..3 {
        anj.step(dm).unwrap();
    }
    let mut buf = [0u8; 1500];
    let n = server.recv(&mut buf).unwrap().expect("client should have sent a Register request");
    let request = TestCodec.decode(&mut buf[..n]).unwrap();
    assert!(matches!(request.operation, Operation::Register(_)));

    let mut response = lwm2m_client::message::Message::request(Operation::Response, "", lwm2m_client::message::Confirmable::Con);
    response.message_id = request.message_id;
    response.token = request.token;
    response.code = CoapCode::CREATED;
    response.location_path.push(b"rd").unwrap();
    response.location_path.push(b"7").unwrap();
    let mut resp_buf = [0u8; 256];
    let resp_len = TestCodec.encode(&response, &mut resp_buf).unwrap();
    server.send(&resp_buf[..resp_len]).unwrap();

    for _ in 0..5 {
        anj.step(dm).unwrap();
        if anj.status() == ConnectionStatus::Registered {
            return;
        }
    }
    panic!("client never reached Registered status");
}

// These helper trait calls need `Transport` in scope for `.recv`/`.send`.
use lwm2m_client::Transport as _;

#[test]
fn register_then_update_targets_the_registered_location_path() {
    let (client_transport, mut server_transport) = InMemoryTransport::connect_pair();
    let clock = SteerableClock::new();
    let mut anj = Anj::new(client_transport, clock.clone(), XorShiftRng::new(1), TestCodec, Config::default()).unwrap();
    anj.add_server(1, "coap://server", 300, false);
    let mut dm = TestDataModel::new();

    drive_until_registered(&mut anj, &mut dm, &mut server_transport);

    anj.request_update(1);
    clock.advance(100);

    let mut update_sent = false;
    let mut buf = [0u8; 1500];
    for _ in 0..10 {
        anj.step(&mut dm).unwrap();
        if let Ok(Some(n)) = server_transport.recv(&mut buf) {
            let request = TestCodec.decode(&mut buf[..n]).unwrap();
            assert!(matches!(request.operation, Operation::Update(_)));
            assert_eq!(request.uri_path, "/rd/7");

            let mut response = lwm2m_client::message::Message::request(Operation::Response, "", lwm2m_client::message::Confirmable::Con);
            response.message_id = request.message_id;
            response.token = request.token;
            response.code = CoapCode::CHANGED;
            let mut resp_buf = [0u8; 64];
            let resp_len = TestCodec.encode(&response, &mut resp_buf).unwrap();
            server_transport.send(&resp_buf[..resp_len]).unwrap();
            update_sent = true;
            break;
        }
    }
    assert!(update_sent, "client never sent the requested Update");

    for _ in 0..5 {
        anj.step(&mut dm).unwrap();
    }
    assert_eq!(anj.status(), ConnectionStatus::Registered);
}

#[test]
fn block_wise_register_spans_multiple_block1_requests() {
    let (client_transport, mut server_transport) = InMemoryTransport::connect_pair();
    let clock = SteerableClock::new();
    let mut anj = Anj::new(client_transport, clock.clone(), XorShiftRng::new(1), TestCodec, Config::default()).unwrap();
    anj.add_server(1, "coap://server", 300, false);
    let mut dm = TestDataModel::new();
    // Enough distinct objects that the rendered Link-Format body exceeds one
    // 1024-byte block, forcing the engine into BLOCK1 upload (RFC 7959).
    for object_id in 0..200u16 {
        dm.declare(object_id, 0, 0, lwm2m_client::ResourceValue::Int(0));
    }

    for _ in 0..3 {
        anj.step(&mut dm).unwrap();
    }

    let mut buf = [0u8; 2048];
    let n = server_transport.recv(&mut buf).unwrap().expect("client should have sent the first Register block");
    let first = TestCodec.decode(&mut buf[..n]).unwrap();
    assert!(matches!(first.operation, Operation::Register(_)));
    let block1 = first.block1.expect("first datagram should carry a block1 option");
    assert_eq!(block1.number, 0);
    assert!(block1.more, "payload exceeds one block, so more must be set");

    let mut continue_resp = lwm2m_client::message::Message::request(Operation::Response, "", lwm2m_client::message::Confirmable::Con);
    continue_resp.message_id = first.message_id;
    continue_resp.token = first.token;
    continue_resp.code = CoapCode::CONTINUE;
    let mut resp_buf = [0u8; 64];
    let resp_len = TestCodec.encode(&continue_resp, &mut resp_buf).unwrap();
    server_transport.send(&resp_buf[..resp_len]).unwrap();

    let mut registered = false;
    let mut saw_second_block = false;
    for _ in 0..20 {
        anj.step(&mut dm).unwrap();
        if let Ok(Some(n)) = server_transport.recv(&mut buf) {
            let request = TestCodec.decode(&mut buf[..n]).unwrap();
            assert!(matches!(request.operation, Operation::Register(_)));
            if let Some(b) = request.block1 {
                assert_eq!(b.number, 1, "second block should advance the block number");
                saw_second_block = true;
            }
            let mut response = lwm2m_client::message::Message::request(Operation::Response, "", lwm2m_client::message::Confirmable::Con);
            response.message_id = request.message_id;
            response.token = request.token;
            response.code = CoapCode::CREATED;
            response.location_path.push(b"rd").unwrap();
            response.location_path.push(b"3").unwrap();
            let resp_len = TestCodec.encode(&response, &mut resp_buf).unwrap();
            server_transport.send(&resp_buf[..resp_len]).unwrap();
        }
        if anj.status() == ConnectionStatus::Registered {
            registered = true;
            break;
        }
    }
    assert!(saw_second_block, "client never sent the second block1 continuation");
    assert!(registered, "client never reached Registered status after the block-wise Register");
}

#[test]
fn no_second_exchange_starts_while_one_is_ongoing() {
    let (client_transport, mut server_transport) = InMemoryTransport::connect_pair();
    let clock = SteerableClock::new();
    let mut anj = Anj::new(client_transport, clock.clone(), XorShiftRng::new(1), TestCodec, Config::default()).unwrap();
    anj.add_server(1, "coap://server", 300, false);
    let mut dm = TestDataModel::new();

    for _ in 0..5 {
        anj.step(&mut dm).unwrap();
        if matches!(anj.status(), ConnectionStatus::Registering(_)) {
            break;
        }
    }
    // The Register exchange is now in flight. Requesting an update while
    // still registering must not produce a second outgoing datagram until
    // the first exchange resolves.
    anj.request_update(1);
    anj.step(&mut dm).unwrap();

    let mut buf = [0u8; 1500];
    let mut datagrams = 0;
    while server_transport.recv(&mut buf).unwrap().is_some() {
        datagrams += 1;
    }
    assert_eq!(datagrams, 1, "exactly one exchange (Register) should be in flight");
}
