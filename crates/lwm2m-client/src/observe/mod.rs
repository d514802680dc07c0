// crates/lwm2m-client/src/observe/mod.rs

//! The observation/notification engine (spec §4.7): per-server observation
//! storage, Write-Attributes inheritance, condition evaluation and
//! notification scheduling, for both single-path and composite observations.

mod attributes;
mod condition;

pub use attributes::{AttributeEntry, AttributeStore, Attributes};
pub use condition::{due, next_deadline_ms, value_condition_met};

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::common::Token;
use crate::dm::{DataModel, ResourceKind};
use crate::error::{CoreError, DmError};
use crate::exchange::ExchangeHandler;
use crate::message::Message;
use crate::types::{ContentFormat, Ssid, MAX_OBSERVATIONS, OBSERVE_NUMBER_MODULO};

/// Reason a data-model change is reported to the observation engine (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataModelChange {
    ValueChanged,
    Added,
    Deleted,
}

/// One observation slot: a plain single-path observation, or one member of a
/// composite group. Composite membership is an intrusive circular list of
/// array indices (`prev`): `None` for a non-composite observation, `Some(self)`
/// as the self-loop sentinel for a single-member group, otherwise a pointer
/// to the previous member so the whole group can be walked in O(n).
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub ssid: Ssid,
    pub token: Token,
    pub path: String,
    pub attrs: Attributes,
    pub last_sent_value: Option<crate::dm::ResourceValue>,
    pub last_notify_ms: u64,
    pub observe_number: u32,
    pub active: bool,
    pub notification_pending: bool,
    pub content_format: Option<ContentFormat>,
    pub accept: Option<ContentFormat>,
    pub prev: Option<usize>,
}

/// One group of observations (one or more members sharing a token) that the
/// core found due for a notification.
pub struct DueNotification {
    pub ssid: Ssid,
    pub token: Token,
    pub members: Vec<usize>,
    pub paths: Vec<String>,
    pub content_format: Option<ContentFormat>,
    pub accept: Option<ContentFormat>,
    pub confirmable: bool,
    pub observe_number: u32,
}

fn path_is_within(path: &str, prefix: &str) -> bool {
    path == prefix || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

pub struct ObservationEngine {
    slots: [Option<Observation>; MAX_OBSERVATIONS],
    attributes: AttributeStore,
}

impl ObservationEngine {
    pub fn new() -> Self {
        ObservationEngine { slots: core::array::from_fn(|_| None), attributes: AttributeStore::new() }
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }

    fn effective_for_resource(
        &self,
        ssid: Ssid,
        path: &str,
        own_attrs: Attributes,
        dm: &mut dyn DataModel,
        is_composite: bool,
    ) -> Result<Attributes, CoreError> {
        let inherited = self.attributes.effective_for(ssid, path);
        // §4.7: a non-empty attribute set on the observe request itself
        // supersedes inheritance rather than overlaying it.
        let base = if own_attrs == Attributes::default() { inherited } else { own_attrs };
        base.validate()?;
        if is_composite {
            return Ok(base.without_change_value());
        }
        let kind = dm.get_resource_type(path).unwrap_or(ResourceKind::Opaque);
        let is_multi = matches!(kind, ResourceKind::Multiple);
        Ok(base.applicable_to(kind, is_multi, false))
    }

    /// Establishes a single-path observation. Returns the slot index.
    pub fn observe(
        &mut self,
        ssid: Ssid,
        token: Token,
        path: &str,
        own_attrs: Attributes,
        content_format: Option<ContentFormat>,
        accept: Option<ContentFormat>,
        dm: &mut dyn DataModel,
    ) -> Result<usize, CoreError> {
        if !dm.path_has_readable_resources(path)? {
            return Err(CoreError::DataModel(DmError::NotFound));
        }
        let attrs = self.effective_for_resource(ssid, path, own_attrs, dm, false)?;
        let idx = self.free_slot().ok_or(CoreError::ObservationTableFull)?;
        let last_sent_value = if attrs.has_change_value_condition() { dm.get_resource_value(path).ok() } else { None };
        self.slots[idx] = Some(Observation {
            ssid,
            token,
            path: String::from(path),
            attrs,
            last_sent_value,
            last_notify_ms: 0,
            observe_number: 0,
            active: true,
            notification_pending: false,
            content_format,
            accept,
            prev: Some(idx),
        });
        Ok(idx)
    }

    /// Establishes a composite observation across `paths`, all sharing
    /// `token` and a single `observe_number` counter. Returns the member indices.
    pub fn observe_composite(
        &mut self,
        ssid: Ssid,
        token: Token,
        paths: &[&str],
        own_attrs: Attributes,
        content_format: Option<ContentFormat>,
        accept: Option<ContentFormat>,
        dm: &mut dyn DataModel,
    ) -> Result<Vec<usize>, CoreError> {
        if paths.is_empty() {
            return Err(CoreError::InvalidArgument("composite observation needs at least one path"));
        }
        let attrs = self.effective_for_resource(ssid, paths[0], own_attrs, dm, true)?;
        let mut indices = Vec::with_capacity(paths.len());
        for &path in paths {
            if !dm.path_has_readable_resources(path)? {
                for i in &indices {
                    self.slots[*i] = None;
                }
                return Err(CoreError::DataModel(DmError::NotFound));
            }
            let idx = self.free_slot().ok_or_else(|| {
                for i in &indices {
                    self.slots[*i] = None;
                }
                CoreError::ObservationTableFull
            })?;
            self.slots[idx] = Some(Observation {
                ssid,
                token,
                path: String::from(path),
                attrs,
                last_sent_value: None,
                last_notify_ms: 0,
                observe_number: 0,
                active: true,
                notification_pending: false,
                content_format,
                accept,
                prev: None,
            });
            indices.push(idx);
        }
        let n = indices.len();
        for i in 0..n {
            let prev_member = indices[(i + n - 1) % n];
            self.slots[indices[i]].as_mut().unwrap().prev = Some(prev_member);
        }
        Ok(indices)
    }

    /// Walks a composite (or self-looped single) group starting at `start`.
    fn group_members(&self, start: usize) -> Vec<usize> {
        let mut members = Vec::new();
        let mut cur = start;
        loop {
            members.push(cur);
            let prev = match &self.slots[cur] {
                Some(o) => o.prev,
                None => break,
            };
            match prev {
                Some(p) if p != start => cur = p,
                _ => break,
            }
        }
        members
    }

    /// Cancels the observation (or whole composite group) identified by
    /// `(ssid, token)`.
    pub fn cancel(&mut self, ssid: Ssid, token: Token) -> Result<(), CoreError> {
        let start = self
            .slots
            .iter()
            .position(|s| matches!(s, Some(o) if o.ssid == ssid && o.token == token))
            .ok_or(CoreError::ObservationNotFound)?;
        for idx in self.group_members(start) {
            self.slots[idx] = None;
        }
        Ok(())
    }

    /// Updates or inserts the Write-Attributes entry for `(ssid, path)` and
    /// refreshes every active observation rooted at or above it.
    pub fn write_attributes(&mut self, ssid: Ssid, path: &str, attrs: Attributes) -> Result<(), CoreError> {
        self.attributes.set(ssid, path, attrs)?;
        for slot in self.slots.iter_mut() {
            if let Some(o) = slot {
                if o.ssid == ssid && o.active && (o.path == path || path_is_within(path, &o.path) || path_is_within(&o.path, path)) {
                    o.attrs = self.attributes.effective_for(ssid, &o.path);
                }
            }
        }
        Ok(())
    }

    /// Reports a data-model change affecting `path` on `ssid`'s session
    /// (`ssid == 0` for internally-originated changes).
    pub fn data_model_changed(&mut self, ssid: Ssid, path: &str, change: DataModelChange, dm: &mut dyn DataModel) {
        match change {
            DataModelChange::Deleted => {
                self.attributes.remove_subtree(ssid, path);
                for slot in self.slots.iter_mut() {
                    if matches!(slot, Some(o) if o.ssid == ssid && path_is_within(&o.path, path)) {
                        *slot = None;
                    }
                }
            }
            DataModelChange::Added => {
                for slot in self.slots.iter_mut() {
                    if let Some(o) = slot {
                        if o.ssid == ssid && (path_is_within(&o.path, path) || path_is_within(path, &o.path)) {
                            o.active = true;
                            o.notification_pending = true;
                        }
                    }
                }
            }
            DataModelChange::ValueChanged => {
                for slot in self.slots.iter_mut() {
                    if let Some(o) = slot {
                        if o.ssid == ssid && o.active && o.path == path {
                            if let Ok(current) = dm.get_resource_value(path) {
                                if value_condition_met(&o.attrs, o.last_sent_value.as_ref(), &current) {
                                    o.notification_pending = true;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Finds the first observation (of `ssid`'s session) due for a
    /// notification right now, building the group's member list.
    pub fn process(&self, ssid: Ssid, now_ms: u64) -> Option<DueNotification> {
        let idx = self.slots.iter().position(|s| {
            matches!(s, Some(o) if o.ssid == ssid && o.active && due(&o.attrs, now_ms, o.last_notify_ms, o.notification_pending))
        })?;
        let members = self.group_members(idx);
        let first = self.slots[idx].as_ref().unwrap();
        let paths = members.iter().map(|&i| self.slots[i].as_ref().unwrap().path.clone()).collect();
        Some(DueNotification {
            ssid,
            token: first.token,
            members,
            paths,
            content_format: first.content_format,
            accept: first.accept,
            confirmable: first.attrs.con.unwrap_or(true),
            observe_number: first.observe_number,
        })
    }

    /// Earliest deadline (ms) any active observation of `ssid` needs a
    /// `process` re-check by.
    pub fn next_deadline(&self, ssid: Ssid, now_ms: u64) -> Option<u64> {
        self.slots
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|o| o.ssid == ssid && o.active)
            .filter_map(|o| next_deadline_ms(&o.attrs, now_ms, o.last_notify_ms, o.notification_pending))
            .min()
    }

    /// Records a successful notification send for an entire group: advances
    /// the shared `observe_number`, clears the pending flag and, where a
    /// change-value condition is set, refreshes `last_sent_value`.
    pub fn mark_sent(&mut self, members: &[usize], now_ms: u64, dm: &mut dyn DataModel) {
        let next_number = members
            .first()
            .and_then(|&i| self.slots[i].as_ref())
            .map(|o| (o.observe_number + 1) % OBSERVE_NUMBER_MODULO)
            .unwrap_or(0);
        for &idx in members {
            if let Some(o) = self.slots[idx].as_mut() {
                o.last_notify_ms = now_ms;
                o.notification_pending = false;
                o.observe_number = next_number;
                if o.attrs.has_change_value_condition() {
                    o.last_sent_value = dm.get_resource_value(&o.path).ok();
                }
            }
        }
    }

    /// Clears specific observation slots directly, given the member indices
    /// a prior `process` call returned. Used when a NOTIFY's completion
    /// callback reports the peer reset or error-responded (§4.7: either
    /// cancels the whole group).
    pub fn cancel_members(&mut self, members: &[usize]) {
        for &idx in members {
            self.slots[idx] = None;
        }
    }

    /// Drops every active observation belonging to `ssid` (used when a
    /// server's registration is torn down).
    pub fn drop_session(&mut self, ssid: Ssid) {
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(o) if o.ssid == ssid) {
                *slot = None;
            }
        }
        // Attribute entries persist across sessions per §4.7; only
        // observation slots are session-scoped state here.
    }
}

impl Default for ObservationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders a group's current resource values as a simple, self-describing
/// `path=value` record list. A stand-in for an external SenML/OMA-CBOR
/// encoder (outside this crate's scope, see `message::Codec`): enough for
/// this engine to demonstrate notification payload construction end-to-end.
fn render_plain_records(dm: &mut dyn DataModel, paths: &[String], out: &mut Vec<u8>) -> Result<(), DmError> {
    out.clear();
    for path in paths {
        let value = dm.get_resource_value(path)?;
        out.extend_from_slice(path.as_bytes());
        out.push(b'=');
        match value {
            crate::dm::ResourceValue::String(s) => out.extend_from_slice(s.as_bytes()),
            crate::dm::ResourceValue::Opaque(bytes) => out.extend_from_slice(&bytes),
            crate::dm::ResourceValue::Bool(b) => out.extend_from_slice(if b { b"true" } else { b"false" }),
            other => {
                if let Some(v) = other.as_f64() {
                    out.extend_from_slice(alloc::format!("{v}").as_bytes());
                }
            }
        }
        out.push(b';');
    }
    Ok(())
}

/// Outcome of one NOTIFY exchange: whether the peer reset it (cancelling the
/// observation group) or returned an error response.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyOutcome {
    pub cancel_group: bool,
    pub failed: bool,
}

/// Sends one group's notification payload and records whether the server
/// reset or error-responded (either of which cancels the group, §4.7).
pub struct NotifyHandler {
    paths: Vec<String>,
    rendered: Vec<u8>,
    outcome: Rc<RefCell<NotifyOutcome>>,
}

impl NotifyHandler {
    pub fn new(paths: Vec<String>, outcome: Rc<RefCell<NotifyOutcome>>) -> Self {
        NotifyHandler { paths, rendered: Vec::new(), outcome }
    }
}

impl ExchangeHandler for NotifyHandler {
    fn read_payload(&mut self, _dm: &mut dyn DataModel, _payload: &[u8]) -> Result<(), DmError> {
        Ok(())
    }

    fn write_payload<'a>(&'a mut self, dm: &mut dyn DataModel, offset: usize, max_len: usize) -> Result<(&'a [u8], bool), DmError> {
        if offset == 0 {
            render_plain_records(dm, &self.paths, &mut self.rendered)?;
        }
        Ok(crate::exchange::block_slice(&self.rendered, offset, max_len))
    }

    fn completion(&mut self, _dm: &mut dyn DataModel, response: Option<&Message<'_>>) -> Result<(), CoreError> {
        let mut outcome = self.outcome.borrow_mut();
        match response {
            Some(resp) if matches!(resp.operation, crate::types::Operation::CoapReset) => outcome.cancel_group = true,
            Some(resp) if resp.code.is_error() => outcome.cancel_group = true,
            Some(_) => {}
            None => outcome.failed = true,
        }
        Ok(())
    }
}
