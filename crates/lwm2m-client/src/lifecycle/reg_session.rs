// crates/lwm2m-client/src/lifecycle/reg_session.rs

//! The per-server registration session sub-FSM: what a REGISTERED client
//! does between the initial Register exchange and the next Deregister,
//! Update or queue-mode transition.

/// States of one server's registration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No exchange in flight; the IDLE checklist (§4.5) runs every tick.
    Idle,
    /// Queue-mode grace period elapsed with nothing to send; closing the transport.
    EnteringQueueMode,
    /// Transport closed; only a forced wake-up or outgoing Send can exit this state.
    QueueMode,
    /// Re-opening the transport to resume normal operation from queue mode.
    ExitingQueueMode,
    /// An Update, Send or server-initiated exchange is in flight.
    Exchange,
    /// A Deregister exchange is in flight, or has just completed.
    Disconnect,
}

/// Reasons the IDLE checklist can decide to leave `Idle`, in priority order
/// (spec.md §4.5): a forced transition always wins over scheduled work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    Disconnect,
    SendUpdateWithLifetime,
    SendUpdateWithPayload,
    SendUpdate,
    ServiceSendQueue,
    ServiceNotify,
    EnterQueueMode,
}

/// Per-server session bookkeeping, independent of the exchange engine itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegSession {
    pub state: SessionState,
    pub lifetime_s: u32,
    pub last_update_ms: u64,
    pub queue_mode: bool,
    /// Set when the lifetime resource changed and the server has not been told yet.
    pub update_with_lifetime: bool,
    /// Set when object/resource availability changed (new/removed Object Instance)
    /// and the server has not been told yet. Tracked separately from
    /// `update_with_lifetime` since either can be true independently.
    pub update_with_payload: bool,
    /// Diagnostic counter: how many times this session has entered queue mode.
    pub queue_mode_entries: u32,
}

/// Fraction of the lifetime, in percent, at which an Update is sent early to
/// leave margin for network delay and retransmission.
const UPDATE_MARGIN_PERCENT: u64 = 80;

impl RegSession {
    pub fn new(lifetime_s: u32, queue_mode: bool, now_ms: u64) -> Self {
        RegSession {
            state: SessionState::Idle,
            lifetime_s,
            last_update_ms: now_ms,
            queue_mode,
            update_with_lifetime: false,
            update_with_payload: false,
            queue_mode_entries: 0,
        }
    }

    /// Absolute deadline by which an Update (or re-registration) must be sent
    /// to keep the registration alive, 80% of the way through the lifetime
    /// window to leave margin for network delay (§4.5).
    pub fn next_update_time(&self) -> u64 {
        let window_ms = (self.lifetime_s as u64).saturating_mul(1000);
        self.last_update_ms + (window_ms * UPDATE_MARGIN_PERCENT) / 100
    }

    /// Runs the ordered IDLE checklist (§4.5) and returns the first
    /// applicable action, or `None` if there is nothing to do and the
    /// session should keep waiting.
    pub fn idle_checklist(&self, now_ms: u64, disconnect_requested: bool, send_queue_has_work: bool, notify_ready: bool) -> Option<IdleAction> {
        if disconnect_requested {
            return Some(IdleAction::Disconnect);
        }
        if self.update_with_lifetime {
            return Some(IdleAction::SendUpdateWithLifetime);
        }
        if self.update_with_payload {
            return Some(IdleAction::SendUpdateWithPayload);
        }
        if now_ms >= self.next_update_time() {
            return Some(IdleAction::SendUpdate);
        }
        if send_queue_has_work {
            return Some(IdleAction::ServiceSendQueue);
        }
        if notify_ready {
            return Some(IdleAction::ServiceNotify);
        }
        if self.queue_mode && self.state == SessionState::Idle {
            return Some(IdleAction::EnterQueueMode);
        }
        None
    }

    /// Records a successful Update/Register exchange: clears the pending
    /// dirty flags and restarts the lifetime window.
    pub fn on_update_success(&mut self, now_ms: u64, new_lifetime_s: Option<u32>) {
        if let Some(l) = new_lifetime_s {
            self.lifetime_s = l;
        }
        self.last_update_ms = now_ms;
        self.update_with_lifetime = false;
        self.update_with_payload = false;
        self.state = SessionState::Idle;
    }

    pub fn enter_queue_mode(&mut self) {
        self.state = SessionState::QueueMode;
        self.queue_mode_entries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checklist_prioritises_disconnect_over_everything() {
        let s = RegSession::new(100, true, 0);
        assert_eq!(s.idle_checklist(0, true, true, true), Some(IdleAction::Disconnect));
    }

    #[test]
    fn checklist_prefers_dirty_lifetime_over_scheduled_update() {
        let mut s = RegSession::new(100, false, 0);
        s.update_with_lifetime = true;
        assert_eq!(s.idle_checklist(0, false, false, false), Some(IdleAction::SendUpdateWithLifetime));
    }

    #[test]
    fn next_update_time_is_eighty_percent_of_lifetime() {
        let s = RegSession::new(100, false, 0);
        assert_eq!(s.next_update_time(), 80_000);
    }

    #[test]
    fn enters_queue_mode_only_when_nothing_else_pending() {
        let s = RegSession::new(100, true, 0);
        assert_eq!(s.idle_checklist(0, false, false, false), Some(IdleAction::EnterQueueMode));
    }

    #[test]
    fn checklist_services_send_queue_before_notify() {
        let s = RegSession::new(100, false, 0);
        assert_eq!(s.idle_checklist(0, false, true, true), Some(IdleAction::ServiceSendQueue));
        assert_eq!(s.idle_checklist(0, false, false, true), Some(IdleAction::ServiceNotify));
    }
}
