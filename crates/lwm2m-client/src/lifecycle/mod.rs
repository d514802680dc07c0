// crates/lwm2m-client/src/lifecycle/mod.rs

//! The client lifecycle state machine (§4.2-§4.6): `Anj`, the single
//! top-level object an application drives by calling `step` on a timer or
//! whenever the transport has data.

mod bootstrap;
mod register;
mod reg_session;
mod retry;

pub use bootstrap::{BootstrapPhase, BootstrapState};
pub use reg_session::{IdleAction, RegSession, SessionState};
pub use retry::{RetryConfig, RetryState};

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::common::{LocationPath, Token};
use crate::config::Config;
use crate::dm::DataModel;
use crate::error::CoreError;
use crate::exchange::{ExchangeEngine, ExchangeHandler, NoOpHandler, UdpTxParams};
use crate::hal::{Clock, Rng, Transport};
use crate::log::{lwm2m_info, lwm2m_warn};
use crate::message::Confirmable;
use crate::observe::{Attributes, DataModelChange, NotifyHandler, NotifyOutcome, ObservationEngine};
use crate::send::{SendHandler, SendOutcome, SendQueue};
use crate::types::{ContentFormat, NotificationAttributes, Operation, RegisterAttributes, Ssid};

use bootstrap::{BootstrapRequestHandler, BootstrapRequestOutcome};
use register::{build_deregister, build_register, build_update, RegisterHandler, RegisterOutcome};

/// Top-level connection state (§4.2), mirroring the core LwM2M client state
/// diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No server configured, or a forced restart just happened.
    Initial,
    /// Running the bootstrap sequence against the Bootstrap Server.
    Bootstrapping,
    /// A Register exchange is in flight against `Ssid`.
    Registering(Ssid),
    /// At least one server session is registered and idling/updating.
    Registered,
    /// Every session is in queue mode: transport closed, only forced
    /// transitions or outgoing Sends wake the client up.
    Queue,
    /// Disabled by `disable_server`/a fatal registration failure; waiting
    /// for a forced transition.
    Suspended,
}

/// What the caller should do after a `step` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Nothing more to do this tick; call `step` again no later than this
    /// absolute deadline (ms, per `Clock::now_ms`), or sooner if new data arrives.
    Wait(u64),
    /// The client is fully idle with no scheduled work (e.g. `Suspended`).
    Idle,
}

#[derive(Debug, Clone, Copy, Default)]
struct ForcedTransitions {
    restart: bool,
    bootstrap: bool,
    disable: Option<Ssid>,
}

/// Which IDLE-checklist action the exchange currently in flight corresponds
/// to, so `step_registered` knows what to do with it once it finishes.
enum PendingRegisteredAction {
    Send { id: u16 },
    Notify { members: Vec<usize> },
}

struct ServerEntry {
    ssid: Ssid,
    reg: RegSession,
    retry: RetryState,
    server_uri: alloc::string::String,
    location: Option<LocationPath>,
}

/// Renders a stored Location-Path back into a `/`-joined URI for Update/Deregister.
fn render_uri(location: &LocationPath) -> String {
    let mut uri = String::new();
    for segment in location.iter() {
        uri.push('/');
        uri.push_str(core::str::from_utf8(segment).unwrap_or(""));
    }
    uri
}

/// The client lifecycle context: owns the transport, clock, RNG and wire
/// codec so retransmissions can happen without the host re-driving every
/// tick, and takes the data-model facade by reference on each `step` call.
pub struct Anj<T: Transport, C: Clock, R: Rng, Cd: crate::message::Codec> {
    transport: T,
    clock: C,
    rng: R,
    codec: Cd,
    config: Config,
    status: ConnectionStatus,
    servers: Vec<ServerEntry>,
    bootstrap: Option<BootstrapState>,
    engine: ExchangeEngine<Box<dyn ExchangeHandler>>,
    forced: ForcedTransitions,
    register_outcome: Rc<RefCell<RegisterOutcome>>,
    bootstrap_outcome: Rc<RefCell<BootstrapRequestOutcome>>,
    observe: ObservationEngine,
    send_queue: SendQueue,
    notify_outcome: Rc<RefCell<NotifyOutcome>>,
    send_outcome: Rc<RefCell<SendOutcome>>,
    pending_action: Option<PendingRegisteredAction>,
}

impl<T: Transport, C: Clock, R: Rng, Cd: crate::message::Codec> Anj<T, C, R, Cd> {
    pub fn new(transport: T, clock: C, rng: R, codec: Cd, config: Config) -> Result<Self, CoreError> {
        config.validate()?;
        let tx_params = UdpTxParams {
            ack_timeout_ms: config.ack_timeout_ms,
            ack_random_factor: config.ack_random_factor,
            max_retransmit: config.max_retransmit,
        };
        Ok(Anj {
            transport,
            clock,
            rng,
            codec,
            config,
            status: ConnectionStatus::Initial,
            servers: Vec::new(),
            bootstrap: None,
            engine: ExchangeEngine::new(tx_params, Box::new(NoOpHandler)),
            forced: ForcedTransitions::default(),
            register_outcome: Rc::new(RefCell::new(RegisterOutcome::default())),
            bootstrap_outcome: Rc::new(RefCell::new(BootstrapRequestOutcome::default())),
            observe: ObservationEngine::new(),
            send_queue: SendQueue::new(config.send_queue_capacity),
            notify_outcome: Rc::new(RefCell::new(NotifyOutcome::default())),
            send_outcome: Rc::new(RefCell::new(SendOutcome::default())),
            pending_action: None,
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Registers one server to use once bootstrapped or configured directly,
    /// e.g. by application-provided factory-bootstrap credentials.
    pub fn add_server(&mut self, ssid: Ssid, server_uri: &str, lifetime_s: u32, queue_mode: bool) {
        let now = self.clock.now_ms();
        self.servers.push(ServerEntry {
            ssid,
            reg: RegSession::new(lifetime_s, queue_mode, now),
            retry: RetryState::new(RetryConfig::default()),
            server_uri: String::from(server_uri),
            location: None,
        });
    }

    /// Forces a restart: tears down the current session and re-runs server
    /// selection from `Initial`. Highest-priority forced transition (§4.6).
    pub fn restart(&mut self) {
        self.forced.restart = true;
    }

    /// Forces a bootstrap sequence even if servers are already configured.
    /// Second-highest priority forced transition.
    pub fn request_bootstrap(&mut self) {
        self.forced.bootstrap = true;
    }

    /// Disables one server: it is dropped from rotation until `restart`.
    /// Lowest-priority forced transition.
    pub fn disable_server(&mut self, ssid: Ssid) {
        self.forced.disable = Some(ssid);
    }

    /// Marks `ssid`'s session dirty so the next IDLE checklist pass sends an
    /// Update carrying the current object/resource availability.
    pub fn request_update(&mut self, ssid: Ssid) {
        if let Some(s) = self.servers.iter_mut().find(|s| s.ssid == ssid) {
            s.reg.update_with_payload = true;
        }
    }

    /// Establishes a single-path observation for `ssid`, minting a fresh
    /// token (§4.7); the token is what the host echoes to correlate
    /// subsequent cancel/notify traffic.
    pub fn observe(
        &mut self,
        ssid: Ssid,
        path: &str,
        attrs: Attributes,
        content_format: Option<ContentFormat>,
        accept: Option<ContentFormat>,
        dm: &mut dyn DataModel,
    ) -> Result<Token, CoreError> {
        let mut token_bytes = [0u8; crate::types::MAX_TOKEN_LEN];
        self.rng.fill_bytes(&mut token_bytes);
        let token = Token::new(&token_bytes)?;
        self.observe.observe(ssid, token, path, attrs, content_format, accept, dm)?;
        Ok(token)
    }

    /// Establishes a composite observation across `paths` for `ssid`.
    pub fn observe_composite(
        &mut self,
        ssid: Ssid,
        paths: &[&str],
        attrs: Attributes,
        content_format: Option<ContentFormat>,
        accept: Option<ContentFormat>,
        dm: &mut dyn DataModel,
    ) -> Result<Token, CoreError> {
        let mut token_bytes = [0u8; crate::types::MAX_TOKEN_LEN];
        self.rng.fill_bytes(&mut token_bytes);
        let token = Token::new(&token_bytes)?;
        self.observe.observe_composite(ssid, token, paths, attrs, content_format, accept, dm)?;
        Ok(token)
    }

    /// Cancels the observation (or whole composite group) named by `(ssid, token)`.
    pub fn cancel_observation(&mut self, ssid: Ssid, token: Token) -> Result<(), CoreError> {
        self.observe.cancel(ssid, token)
    }

    /// Updates (or inserts) the effective Write-Attributes for `(ssid, path)`.
    pub fn write_attributes(&mut self, ssid: Ssid, path: &str, attrs: Attributes) -> Result<(), CoreError> {
        self.observe.write_attributes(ssid, path, attrs)
    }

    /// Reports a data-model change so the observation engine can re-evaluate
    /// affected observations (§4.7).
    pub fn data_model_changed(&mut self, ssid: Ssid, path: &str, change: DataModelChange, dm: &mut dyn DataModel) {
        self.observe.data_model_changed(ssid, path, change, dm);
    }

    /// Queues a client-initiated LwM2M Send of `paths`'s current values to
    /// `ssid`, rejecting it per §4.9 if not REGISTERED or if Mute Send
    /// (`/1/x/23`) is set on that server.
    pub fn send_request(&mut self, ssid: Ssid, paths: Vec<String>, content_format: Option<ContentFormat>, dm: &mut dyn DataModel) -> Result<u16, CoreError> {
        let is_registered = matches!(self.status, ConnectionStatus::Registered | ConnectionStatus::Queue) && self.servers.iter().any(|s| s.ssid == ssid);
        let muted = self.is_mute_send(ssid, dm);
        self.send_queue.register(ssid, paths, content_format, is_registered, muted)
    }

    /// Aborts one pending Send request.
    pub fn send_abort(&mut self, id: u16) {
        self.send_queue.abort_one(id);
    }

    /// Aborts every pending Send request.
    pub fn send_abort_all(&mut self) {
        self.send_queue.abort_all();
    }

    /// Reads the Mute Send resource (`/1/x/23`) for `ssid`'s Server Object
    /// instance; absent or unreadable is treated as not muted.
    fn is_mute_send(&self, ssid: Ssid, dm: &mut dyn DataModel) -> bool {
        let Ok(Some(iid)) = dm.find_server_instance(ssid) else {
            return false;
        };
        let path = alloc::format!("/1/{iid}/23");
        match dm.get_resource_value(&path) {
            Ok(crate::dm::ResourceValue::Bool(b)) => b,
            _ => false,
        }
    }

    /// Advances the lifecycle by one tick: drains the transport, advances
    /// whatever exchange is in flight, and runs the IDLE checklist for the
    /// active state.
    pub fn step(&mut self, dm: &mut dyn DataModel) -> Result<NextAction, CoreError> {
        let now = self.clock.now_ms();

        if self.apply_forced_transitions(now, dm) {
            lwm2m_info!("forced transition applied, status is now {:?}", self.status);
        }

        match self.status {
            ConnectionStatus::Initial => self.step_initial(now),
            ConnectionStatus::Bootstrapping => self.step_bootstrapping(now, dm),
            ConnectionStatus::Registering(ssid) => self.step_registering(now, ssid, dm),
            ConnectionStatus::Registered => self.step_registered(now, dm),
            ConnectionStatus::Queue => Ok(NextAction::Wait(now + self.config.server_request_timeout_ms)),
            ConnectionStatus::Suspended => Ok(NextAction::Idle),
        }
    }

    /// Earliest deadline any active session or in-flight exchange needs
    /// `step` called again by, for schedulers that want to sleep exactly
    /// that long instead of polling.
    pub fn next_step_time(&self) -> Option<u64> {
        match self.status {
            ConnectionStatus::Suspended => None,
            _ => self.servers.iter().map(|s| s.reg.next_update_time()).min(),
        }
    }

    fn apply_forced_transitions(&mut self, now: u64, dm: &mut dyn DataModel) -> bool {
        if self.forced.restart {
            self.forced.restart = false;
            self.forced.bootstrap = false;
            self.forced.disable = None;
            self.engine.terminate(dm);
            self.bootstrap = None;
            self.pending_action = None;
            let ssids: Vec<Ssid> = self.servers.iter().map(|s| s.ssid).collect();
            for ssid in ssids {
                self.observe.drop_session(ssid);
            }
            self.status = ConnectionStatus::Initial;
            return true;
        }
        if self.forced.bootstrap {
            self.forced.bootstrap = false;
            self.engine.terminate(dm);
            self.bootstrap = Some(BootstrapState::new(now, self.config.bootstrap_timeout_s));
            self.status = ConnectionStatus::Bootstrapping;
            return true;
        }
        if let Some(ssid) = self.forced.disable.take() {
            self.servers.retain(|s| s.ssid != ssid);
            self.observe.drop_session(ssid);
            if self.servers.is_empty() {
                self.status = ConnectionStatus::Suspended;
            }
            return true;
        }
        false
    }

    fn step_initial(&mut self, now: u64) -> Result<NextAction, CoreError> {
        if self.servers.is_empty() {
            self.bootstrap = Some(BootstrapState::new(now, self.config.bootstrap_timeout_s));
            self.status = ConnectionStatus::Bootstrapping;
        } else {
            let ssid = self.servers[0].ssid;
            self.start_register(now, ssid)?;
            self.status = ConnectionStatus::Registering(ssid);
        }
        Ok(NextAction::Wait(now))
    }

    fn step_bootstrapping(&mut self, now: u64, dm: &mut dyn DataModel) -> Result<NextAction, CoreError> {
        let timed_out = self.bootstrap.as_ref().map(|b| b.timed_out(now)).unwrap_or(true);
        if timed_out {
            lwm2m_warn!("bootstrap sequence timed out");
            self.status = ConnectionStatus::Suspended;
            return Err(CoreError::BootstrapTimeout);
        }

        if !self.engine.ongoing() {
            let outcome = *self.bootstrap_outcome.borrow();
            if outcome.accepted {
                if let Some(b) = self.bootstrap.as_mut() {
                    b.finish(dm)?;
                }
                self.status = ConnectionStatus::Initial;
            } else {
                let already_requested = self.bootstrap.as_ref().map(|b| b.requested).unwrap_or(false);
                if already_requested {
                    let retry = {
                        let b = self.bootstrap.as_mut().ok_or(CoreError::Internal("bootstrap state missing"))?;
                        b.requested = false;
                        b.record_request_failure(now, self.config.bootstrap_retry_timeout_s, self.config.bootstrap_retry_count)
                    };
                    match retry {
                        Some(deadline) => return Ok(NextAction::Wait(deadline)),
                        None => {
                            lwm2m_warn!("bootstrap request retries exhausted");
                            self.status = ConnectionStatus::Suspended;
                            return Err(CoreError::BootstrapTimeout);
                        }
                    }
                }
                let ready_at = self.bootstrap.as_ref().map(|b| b.retry_not_before_ms).unwrap_or(now);
                if now < ready_at {
                    return Ok(NextAction::Wait(ready_at));
                }
                self.bootstrap_outcome.replace(BootstrapRequestOutcome::default());
                let handler = BootstrapRequestHandler::new(self.bootstrap_outcome.clone());
                self.engine.new_client_request(
                    now,
                    &mut self.rng,
                    crate::types::Operation::BootstrapRequest { preferred_content_format: crate::types::ContentFormat::SenMlCbor },
                    "/bs",
                    Confirmable::Con,
                    None,
                    Box::new(handler),
                )?;
                if let Some(b) = self.bootstrap.as_mut() {
                    b.requested = true;
                }
            }
        }
        self.drive_engine(now, dm)
    }

    fn step_registering(&mut self, now: u64, ssid: Ssid, dm: &mut dyn DataModel) -> Result<NextAction, CoreError> {
        if !self.engine.ongoing() {
            let outcome = self.register_outcome.borrow().clone();
            if let Some(idx) = self.servers.iter().position(|s| s.ssid == ssid) {
                if !outcome.failed {
                    if let Some(location) = outcome.location_path {
                        self.servers[idx].location = Some(location);
                    }
                    self.servers[idx].reg.on_update_success(now, None);
                    self.servers[idx].retry.reset();
                    self.status = ConnectionStatus::Registered;
                } else {
                    match self.servers[idx].retry.record_failure() {
                        Some(delay_s) => return Ok(NextAction::Wait(now + delay_s as u64 * 1000)),
                        None => {
                            lwm2m_warn!("registration retries exhausted for ssid={}", ssid);
                            self.servers.remove(idx);
                            self.status = ConnectionStatus::Initial;
                        }
                    }
                }
            }
        }
        self.drive_engine(now, dm)
    }

    fn step_registered(&mut self, now: u64, dm: &mut dyn DataModel) -> Result<NextAction, CoreError> {
        if self.engine.ongoing() {
            return self.drive_engine(now, dm);
        }
        if let Some(action) = self.pending_action.take() {
            self.finish_pending_action(action, now, dm);
        }

        let mut all_queued = true;
        for idx in 0..self.servers.len() {
            let ssid = self.servers[idx].ssid;
            let send_has_work = self.send_queue.has_work_for(ssid);
            let due = self.observe.process(ssid, now);
            let action = self.servers[idx].reg.idle_checklist(now, false, send_has_work, due.is_some());
            match action {
                Some(IdleAction::Disconnect) => {
                    self.observe.drop_session(ssid);
                    self.start_deregister(now, ssid)?;
                    return Ok(NextAction::Wait(now));
                }
                Some(IdleAction::SendUpdateWithLifetime) | Some(IdleAction::SendUpdateWithPayload) | Some(IdleAction::SendUpdate) => {
                    self.start_register(now, ssid)?;
                    self.status = ConnectionStatus::Registering(ssid);
                    return Ok(NextAction::Wait(now));
                }
                Some(IdleAction::ServiceSendQueue) => {
                    self.start_send(now, ssid)?;
                    return Ok(NextAction::Wait(now));
                }
                Some(IdleAction::ServiceNotify) => {
                    if let Some(due) = due {
                        self.start_notify(now, due)?;
                        return Ok(NextAction::Wait(now));
                    }
                }
                Some(IdleAction::EnterQueueMode) => {
                    self.servers[idx].reg.enter_queue_mode();
                    all_queued = false;
                }
                None => all_queued = false,
            }
        }

        if all_queued && !self.servers.is_empty() {
            self.status = ConnectionStatus::Queue;
        }
        Ok(NextAction::Wait(self.next_step_time().unwrap_or(now + self.config.server_request_timeout_ms)))
    }

    /// Services the head of the Send queue destined for `ssid`: builds the
    /// `INF_CON_SEND` exchange and records which request this tick's
    /// exchange corresponds to, so its completion can pop the queue.
    fn start_send(&mut self, now: u64, ssid: Ssid) -> Result<(), CoreError> {
        let Some(req) = self.send_queue.peek_for(ssid).cloned() else {
            return Ok(());
        };
        self.send_outcome.replace(SendOutcome::default());
        let handler = SendHandler::new(req.paths, self.send_outcome.clone());
        self.engine.new_client_request(now, &mut self.rng, Operation::InfConSend, "/dp", Confirmable::Con, req.content_format, Box::new(handler))?;
        self.pending_action = Some(PendingRegisteredAction::Send { id: req.id });
        Ok(())
    }

    /// Services one due notification group: builds the NOTIFY exchange,
    /// reusing the observation's original token (RFC 7641 §3.4).
    fn start_notify(&mut self, now: u64, due: crate::observe::DueNotification) -> Result<(), CoreError> {
        self.notify_outcome.replace(NotifyOutcome::default());
        let handler = NotifyHandler::new(due.paths, self.notify_outcome.clone());
        let operation = if due.confirmable {
            Operation::InfConNotify(NotificationAttributes { observe_number: due.observe_number })
        } else {
            Operation::InfNonConNotify(NotificationAttributes { observe_number: due.observe_number })
        };
        let confirmable = if due.confirmable { Confirmable::Con } else { Confirmable::NonCon };
        self.engine.new_client_request(now, &mut self.rng, operation, "", confirmable, due.content_format, Box::new(handler))?;
        self.engine.set_client_token(due.token)?;
        self.pending_action = Some(PendingRegisteredAction::Notify { members: due.members });
        Ok(())
    }

    /// Applies the outcome of the Send/Notify exchange that just finished.
    fn finish_pending_action(&mut self, action: PendingRegisteredAction, now: u64, dm: &mut dyn DataModel) {
        match action {
            PendingRegisteredAction::Send { id } => {
                let outcome = *self.send_outcome.borrow();
                self.send_queue.complete_head();
                if outcome.failed {
                    lwm2m_warn!("send id={} failed", id);
                }
            }
            PendingRegisteredAction::Notify { members } => {
                let outcome = *self.notify_outcome.borrow();
                if outcome.cancel_group || outcome.failed {
                    self.observe.cancel_members(&members);
                } else {
                    self.observe.mark_sent(&members, now, dm);
                }
            }
        }
    }

    fn start_register(&mut self, now: u64, ssid: Ssid) -> Result<(), CoreError> {
        let idx = self.servers.iter().position(|s| s.ssid == ssid).ok_or(CoreError::Internal("unknown ssid"))?;
        self.transport.connect(&self.servers[idx].server_uri)?;
        self.register_outcome.replace(RegisterOutcome::default());
        let handler = RegisterHandler::new(self.register_outcome.clone());
        let attrs = RegisterAttributes { lifetime_s: None, lwm2m_version: Some("1.1"), binding: Some("U"), queue_mode: false };

        if let Some(location) = self.servers[idx].location.clone() {
            let uri = render_uri(&location);
            let msg = build_update(&location, attrs, uri.as_str());
            self.engine.new_client_request(now, &mut self.rng, msg.operation, uri.as_str(), Confirmable::Con, None, Box::new(handler))
        } else {
            let msg = build_register("/rd", attrs);
            self.engine.new_client_request(now, &mut self.rng, msg.operation, "/rd", Confirmable::Con, msg.content_format, Box::new(handler))
        }
    }

    fn start_deregister(&mut self, now: u64, ssid: Ssid) -> Result<(), CoreError> {
        let idx = self.servers.iter().position(|s| s.ssid == ssid).ok_or(CoreError::Internal("unknown ssid"))?;
        let uri = self.servers[idx]
            .location
            .clone()
            .map(|l| render_uri(&l))
            .unwrap_or_else(|| String::from("/rd/0"));
        let msg = build_deregister(uri.as_str());
        self.engine.new_client_request(now, &mut self.rng, msg.operation, uri.as_str(), Confirmable::Con, None, Box::new(NoOpHandler))
    }

    fn drive_engine(&mut self, now: u64, dm: &mut dyn DataModel) -> Result<NextAction, CoreError> {
        let mut recv_buf = [0u8; 1500];
        let received = self.transport.recv(&mut recv_buf).map_err(|_| CoreError::TransportError)?;
        let incoming = match received {
            Some(n) => Some(self.codec.decode(&mut recv_buf[..n])?),
            None => None,
        };

        // A fresh request that arrived while the engine was idle is a
        // server-initiated exchange: seed it here so `process` below builds
        // and sends the response instead of trying to match it against a
        // client-initiated exchange that doesn't exist.
        let mut consumed_by_server_request = false;
        if !self.engine.ongoing() {
            if let Some(msg) = incoming.as_ref() {
                if msg.is_request() {
                    let handler = crate::dm_handler::DmHandler::new(msg.operation.clone(), msg.uri_path);
                    self.engine.new_server_request(now, msg, Box::new(handler), dm)?;
                    consumed_by_server_request = true;
                }
            }
        }
        let feed_to_engine = if consumed_by_server_request { None } else { incoming.as_ref() };

        let mut send_len = None;
        let mut send_buf = [0u8; 1500];
        let action = match self.engine.process(now, feed_to_engine, dm)? {
            crate::exchange::EngineOutput::Send(msg) => {
                send_len = Some(self.codec.encode(&msg, &mut send_buf)?);
                NextAction::Wait(now)
            }
            crate::exchange::EngineOutput::WaitUntil(deadline) => NextAction::Wait(deadline),
            crate::exchange::EngineOutput::Idle => NextAction::Wait(now),
        };

        if let Some(len) = send_len {
            self.transport.send(&send_buf[..len]).map_err(|_| CoreError::TransportError)?;
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dm::{DataModel, ReadEntry, ResourceKind, ResourceValue};
    use crate::error::DmError;

    struct FakeClock(core::cell::Cell<u64>);
    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    struct FakeTransport;
    impl Transport for FakeTransport {
        fn connect(&mut self, _server_addr: &str) -> Result<(), CoreError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
        fn send(&mut self, _data: &[u8]) -> Result<(), CoreError> {
            Ok(())
        }
        fn recv(&mut self, _buf: &mut [u8]) -> Result<Option<usize>, CoreError> {
            Ok(None)
        }
    }

    /// Test double for the host wire codec: never exercised since
    /// `FakeTransport::recv` never returns data, but required to construct `Anj`.
    struct FakeCodec;
    impl crate::message::Codec for FakeCodec {
        fn encode(&self, _message: &crate::message::Message<'_>, _buffer: &mut [u8]) -> Result<usize, CoreError> {
            Ok(0)
        }
        fn decode<'a>(&self, _buffer: &'a mut [u8]) -> Result<crate::message::Message<'a>, CoreError> {
            Err(CoreError::Internal("FakeCodec never decodes"))
        }
    }

    struct EmptyDm;
    impl DataModel for EmptyDm {
        fn operation_begin(&mut self) -> Result<(), DmError> {
            Ok(())
        }
        fn operation_end(&mut self) {}
        fn get_readable_res_count(&mut self, _path: &str) -> Result<usize, DmError> {
            Ok(0)
        }
        fn get_read_entry(&mut self, _path: &str, _index: usize) -> Result<ReadEntry, DmError> {
            Ok(ReadEntry::end())
        }
        fn path_has_readable_resources(&mut self, _path: &str) -> Result<bool, DmError> {
            Ok(false)
        }
        fn get_resource_type(&mut self, _path: &str) -> Result<ResourceKind, DmError> {
            Err(DmError::NotFound)
        }
        fn get_resource_value(&mut self, _path: &str) -> Result<ResourceValue, DmError> {
            Err(DmError::NotFound)
        }
        fn write_entry(&mut self, _path: &str, _value: ResourceValue, _replace: bool) -> Result<(), DmError> {
            Err(DmError::NotFound)
        }
        fn create_object_instance(&mut self, _path: &str, _id: Option<u16>) -> Result<u16, DmError> {
            Err(DmError::NotFound)
        }
        fn delete_object_instance(&mut self, _path: &str) -> Result<(), DmError> {
            Err(DmError::NotFound)
        }
        fn execute(&mut self, _path: &str, _args: &[u8]) -> Result<(), DmError> {
            Err(DmError::NotFound)
        }
        fn bootstrap_validate(&mut self) -> Result<(), DmError> {
            Ok(())
        }
        fn find_server_instance(&mut self, _ssid: Ssid) -> Result<Option<u16>, DmError> {
            Ok(None)
        }
        fn find_security_instance(&mut self, _ssid: Ssid) -> Result<Option<u16>, DmError> {
            Ok(None)
        }
    }

    #[test]
    fn no_servers_configured_enters_bootstrapping() {
        let mut anj = Anj::new(FakeTransport, FakeClock(core::cell::Cell::new(0)), crate::hal::XorShiftRng::new(1), FakeCodec, Config::default()).unwrap();
        let mut dm = EmptyDm;
        assert_eq!(anj.step(&mut dm).unwrap(), NextAction::Wait(0));
        assert_eq!(anj.status(), ConnectionStatus::Bootstrapping);
    }

    #[test]
    fn configured_server_goes_straight_to_registering() {
        let mut anj = Anj::new(FakeTransport, FakeClock(core::cell::Cell::new(0)), crate::hal::XorShiftRng::new(1), FakeCodec, Config::default()).unwrap();
        anj.add_server(1, "coap://server", 300, false);
        let mut dm = EmptyDm;
        anj.step(&mut dm).unwrap();
        assert_eq!(anj.status(), ConnectionStatus::Registering(1));
    }

    #[test]
    fn forced_restart_overrides_everything_else() {
        let mut anj = Anj::new(FakeTransport, FakeClock(core::cell::Cell::new(0)), crate::hal::XorShiftRng::new(1), FakeCodec, Config::default()).unwrap();
        anj.add_server(1, "coap://server", 300, false);
        anj.request_bootstrap();
        anj.restart();
        let mut dm = EmptyDm;
        anj.step(&mut dm).unwrap();
        assert_eq!(anj.status(), ConnectionStatus::Registering(1));
    }
}
